//! ABB RWS - Robot Web Services 2.0 client library
//!
//! Talks to ABB robot controllers over RWS 2.0: RAPID execution control,
//! IO signals, persistent variables, the controller file service, the event
//! log and push subscriptions. Writes are coordinated through the
//! controller's mastership protocol.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use abb_rws::{RobotWebServices, RwsClient, RwsConfig, Cycle};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RwsConfig::load_from_path("config/controller.yaml")?;
//!     let client = RwsClient::from_config(&config)?;
//!
//!     println!("Controller state: {}", client.get_controller_state().await?);
//!
//!     client.set_rapid_variable_num("T_ROB1", "test_num", 42.0).await?;
//!     client.set_motors_on().await?;
//!     client.start(Cycle::Once, &["T_ROB1"]).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Session**: authenticated HTTP session (credentials, cookies, TLS flag)
//! - **MastershipArbiter**: scoped acquisition of the controller write lock
//! - **resources**: logical operations as verb, path, query and payload
//! - **marshal**: RWS envelopes into typed records
//! - **Subscription**: push notifications routed back to their subscriptions
//! - **RobotWebServices**: capability trait implemented by `RwsClient` and `MockController`

pub mod client;
pub mod config;
pub mod error;
pub mod interface;
pub mod marshal;
pub mod mastership;
pub mod mock;
pub mod rapid;
pub mod resources;
pub mod session;
pub mod subscription;
pub mod types;

// High-level exports for easy usage
pub use client::RwsClient;
pub use config::{ControllerConfig, DefaultsConfig, RwsConfig, SubscriptionConfig};
pub use error::{Result, RwsError};
pub use interface::RobotWebServices;
pub use mock::MockController;

// Core component exports for advanced usage
pub use mastership::{MastershipArbiter, MastershipState};
pub use resources::RwsRequest;
pub use session::{Credentials, Session, SessionBuilder};
pub use subscription::{
    Notification, Priority, ResourceType, Subscription, SubscriptionEvent, SubscriptionRequest, SubscriptionResource,
};
pub use types::{
    Coordinate, Cycle, EventLogEntry, ExecutionState, IpcMessage, IpcQueueInfo, IpcSend, JointTarget, MotorState,
    RapidSymbol, RapidVariable, RmmpStatus, RobTarget, Signal, SignalAddress, TaskState,
};
