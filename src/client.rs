//! RWS 2.0 client
//!
//! `RwsClient` composes the session, the mastership arbiter, the resource
//! model and the response marshaller. Reads go straight to the session.
//! Single-shot writes rely on implicit mastership; variable writes run inside
//! an explicit mastership scope.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{DefaultsConfig, RwsConfig, DEFAULT_CHANNEL_CAPACITY};
use crate::error::DIPC_QUEUE_EXISTS;
use crate::interface::RobotWebServices;
use crate::mastership::MastershipArbiter;
use crate::resources::{self, RwsRequest};
use crate::session::Session;
use crate::subscription::{Subscription, SubscriptionRequest};
use crate::types::{
    Coordinate, Cycle, EventLogEntry, ExecutionState, IpcMessage, IpcQueueInfo, IpcSend, JointTarget, MotorState,
    RapidSymbol, RmmpStatus, RobTarget, Signal, SignalAddress, TaskState,
};

const RMMP_POLL_INTERVAL: Duration = Duration::from_millis(250);
use crate::{marshal, rapid, Result, RwsError};

pub struct RwsClient {
    session: Session,
    mastership: MastershipArbiter,
    defaults: DefaultsConfig,
    channel_capacity: usize,
}

impl RwsClient {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            mastership: MastershipArbiter::new(),
            defaults: DefaultsConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Build a client from a loaded configuration.
    pub fn from_config(config: &RwsConfig) -> Result<Self> {
        let session = Session::new(&config.controller)?;
        info!("RWS client for {}", session.base_url());
        Ok(Self {
            session,
            mastership: MastershipArbiter::new(),
            defaults: config.defaults(),
            channel_capacity: config.channel_capacity(),
        })
    }

    pub fn with_defaults(mut self, defaults: DefaultsConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn mastership(&self) -> &MastershipArbiter {
        &self.mastership
    }

    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    /// Execute a request against a named resource; 404 becomes `UnknownResource`.
    async fn fetch(&self, request: &RwsRequest, what: impl std::fmt::Display) -> Result<Option<Value>> {
        self.session.execute(request).await.map_err(|e| not_found(e, what))
    }

    async fn send(&self, request: &RwsRequest) -> Result<()> {
        self.session.execute(request).await.map(|_| ())
    }

    /// Network and unit for a write; bare addresses fall back to the defaults.
    fn write_location<'a>(&'a self, signal: &'a SignalAddress) -> (&'a str, &'a str) {
        signal
            .location()
            .unwrap_or((self.defaults.network(), self.defaults.unit()))
    }

    pub async fn get_signal(&self, signal: &SignalAddress) -> Result<Signal> {
        let body = self
            .fetch(&resources::signal(&signal.name, signal.location()), format!("signal {}", signal))
            .await?;
        marshal::signal(body, signal)
    }

    pub async fn get_rapid_variable_num(&self, task: &str, name: &str) -> Result<f64> {
        rapid::parse_num(&self.get_rapid_variable(task, name).await?)
    }

    pub async fn set_rapid_variable_num(&self, task: &str, name: &str, value: f64) -> Result<()> {
        self.set_rapid_variable(task, name, &rapid::format_num(value)).await
    }

    pub async fn get_rapid_variable_num_array(&self, task: &str, name: &str) -> Result<Vec<f64>> {
        rapid::parse_num_array(&self.get_rapid_variable(task, name).await?)
    }

    pub async fn set_rapid_variable_num_array(&self, task: &str, name: &str, values: &[f64]) -> Result<()> {
        self.set_rapid_variable(task, name, &rapid::format_num_array(values)).await
    }

    pub async fn get_rapid_variable_jointtarget(&self, task: &str, name: &str) -> Result<JointTarget> {
        rapid::parse_jointtarget(&self.get_rapid_variable(task, name).await?)
    }

    pub async fn set_rapid_variable_jointtarget(&self, task: &str, name: &str, target: &JointTarget) -> Result<()> {
        self.set_rapid_variable(task, name, &rapid::format_jointtarget(target)).await
    }

    pub async fn get_rapid_variable_jointtarget_array(&self, task: &str, name: &str) -> Result<Vec<JointTarget>> {
        rapid::parse_jointtarget_array(&self.get_rapid_variable(task, name).await?)
    }

    pub async fn set_rapid_variable_jointtarget_array(
        &self,
        task: &str,
        name: &str,
        targets: &[JointTarget],
    ) -> Result<()> {
        self.set_rapid_variable(task, name, &rapid::format_jointtarget_array(targets))
            .await
    }

    /// Persistent variables declared in `task`, or in every task when `None`.
    pub async fn get_rapid_variables(&self, task: Option<&str>) -> Result<Vec<RapidSymbol>> {
        let what = format!("RAPID/{}", task.unwrap_or(""));
        let body = self.fetch(&resources::search_persistent_symbols(task), what).await?;
        marshal::rapid_symbols(body)
    }

    /// Names of the entries in a controller directory.
    pub async fn list_files(&self, directory: &str) -> Result<Vec<String>> {
        let body = self
            .fetch(&resources::list_directory(directory), format!("directory {}", directory))
            .await?;
        marshal::file_names(body)
    }

    /// Read a file as UTF-8 text. `Ok(None)` when it does not exist.
    pub async fn read_file_str(&self, directory: &str, filename: &str) -> Result<Option<String>> {
        match self.read_file(directory, filename).await? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| RwsError::malformed(format!("{}/{} is not UTF-8: {}", directory, filename, e))),
            None => Ok(None),
        }
    }

    /// Read pending messages from an IPC queue, waiting up to `timeout_secs`.
    pub async fn read_ipc_message(&self, queue: &str, timeout_secs: f64) -> Result<Vec<IpcMessage>> {
        let body = self
            .fetch(&resources::ipc_read(queue, timeout_secs), format!("ipc queue {}", queue))
            .await?;
        marshal::ipc_messages(body)
    }

    pub async fn send_ipc_message(&self, target_queue: &str, message: &IpcSend) -> Result<()> {
        debug!("Sending IPC message to {}", target_queue);
        self.fetch(&resources::ipc_send(target_queue, message), format!("ipc queue {}", target_queue))
            .await
            .map(|_| ())
    }

    pub async fn get_ipc_queue(&self, queue: &str) -> Result<IpcQueueInfo> {
        let body = self
            .fetch(&resources::ipc_queue(queue), format!("ipc queue {}", queue))
            .await?;
        marshal::ipc_queue(body, queue)
    }

    /// Create an IPC queue. Returns `false` if the queue already existed.
    pub async fn try_create_ipc_queue(&self, queue: &str, queue_size: u32, max_msg_size: u32) -> Result<bool> {
        match self.send(&resources::ipc_create(queue, queue_size, max_msg_size)).await {
            Ok(()) => {
                info!("Created IPC queue {}", queue);
                Ok(true)
            }
            Err(e) if e.controller_code() == Some(DIPC_QUEUE_EXISTS) => {
                debug!("IPC queue {} already exists", queue);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Request remote mastering and wait up to `timeout` for the pendant
    /// operator to grant it.
    ///
    /// Needed to write persistent variables in manual mode. The grant lapses
    /// unless [`RwsClient::poll_rmmp`] is called periodically afterwards.
    pub async fn request_rmmp(&self, timeout: Duration) -> Result<()> {
        self.send(&resources::rmmp_request()).await?;
        info!("Remote mastering requested, waiting for the pendant");
        let deadline = Instant::now() + timeout;
        loop {
            match self.poll_rmmp().await? {
                RmmpStatus::Granted => {
                    info!("Remote mastering granted");
                    return Ok(());
                }
                RmmpStatus::Pending if Instant::now() < deadline => tokio::time::sleep(RMMP_POLL_INTERVAL).await,
                RmmpStatus::Pending => {
                    warn!("Remote mastering still pending after {:?}", timeout);
                    return Err(RwsError::MastershipDenied(format!(
                        "remote mastering not granted within {:?}",
                        timeout
                    )));
                }
                RmmpStatus::Other(status) => {
                    return Err(RwsError::MastershipDenied(format!("remote mastering {}", status.to_lowercase())));
                }
            }
        }
    }

    /// Poll the remote mastering grant; also keeps an existing grant alive.
    pub async fn poll_rmmp(&self) -> Result<RmmpStatus> {
        marshal::rmmp_status(self.session.execute(&resources::rmmp_poll()).await?)
    }

    /// Open a subscription channel for the given entries.
    pub async fn subscribe(&self, requests: Vec<SubscriptionRequest>) -> Result<Subscription> {
        Subscription::open(&self.session, requests, self.channel_capacity).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await
    }
}

fn not_found(error: RwsError, what: impl std::fmt::Display) -> RwsError {
    match error {
        RwsError::Transport { status: 404, .. } => RwsError::UnknownResource(what.to_string()),
        other => other,
    }
}

#[async_trait]
impl RobotWebServices for RwsClient {
    async fn start_execution(&self, cycle: Cycle) -> Result<()> {
        info!("Starting RAPID execution ({})", cycle.as_str());
        self.send(&resources::execution_start(cycle)).await
    }

    async fn stop(&self) -> Result<()> {
        info!("Stopping RAPID execution");
        self.send(&resources::execution_stop()).await
    }

    async fn resetpp(&self) -> Result<()> {
        self.send(&resources::reset_program_pointer()).await
    }

    async fn get_execution_state(&self) -> Result<ExecutionState> {
        marshal::execution_state(self.session.execute(&resources::execution_state()).await?)
    }

    async fn get_controller_state(&self) -> Result<String> {
        marshal::controller_state(self.session.execute(&resources::controller_state()).await?)
    }

    async fn set_controller_state(&self, state: MotorState) -> Result<()> {
        info!("Setting controller state to {}", state.as_str());
        self.send(&resources::set_controller_state(state)).await
    }

    async fn get_operation_mode(&self) -> Result<String> {
        marshal::operation_mode(self.session.execute(&resources::operation_mode()).await?)
    }

    async fn get_speed_ratio(&self) -> Result<u8> {
        marshal::speed_ratio(self.session.execute(&resources::speed_ratio()).await?)
    }

    async fn set_speed_ratio(&self, ratio: u8) -> Result<()> {
        if ratio > 100 {
            return Err(RwsError::Validation(format!("speed ratio {} out of range 0..100", ratio)));
        }
        self.send(&resources::set_speed_ratio(ratio)).await
    }

    async fn get_digital_io(&self, signal: &SignalAddress) -> Result<u8> {
        self.get_signal(signal).await?.digital()
    }

    async fn set_digital_io(&self, signal: &SignalAddress, value: bool) -> Result<()> {
        let (network, unit) = self.write_location(signal);
        let request = resources::set_digital_signal(network, unit, &signal.name, value);
        self.fetch(&request, format!("signal {}", signal)).await.map(|_| ())
    }

    async fn get_analog_io(&self, signal: &SignalAddress) -> Result<f64> {
        self.get_signal(signal).await?.analog()
    }

    async fn set_analog_io(&self, signal: &SignalAddress, value: f64) -> Result<()> {
        let (network, unit) = self.write_location(signal);
        let request = resources::set_analog_signal(network, unit, &signal.name, value);
        self.fetch(&request, format!("signal {}", signal)).await.map(|_| ())
    }

    async fn get_rapid_variable(&self, task: &str, name: &str) -> Result<String> {
        let body = self
            .fetch(&resources::rapid_variable(task, name), format!("variable {}/{}", task, name))
            .await?;
        marshal::rapid_variable(body)
    }

    async fn set_rapid_variable(&self, task: &str, name: &str, value: &str) -> Result<()> {
        let request = resources::set_rapid_variable(task, name, value);
        debug!("Writing {}/{} = {}", task, name, value);
        self.mastership
            .scoped(&self.session, || async {
                self.fetch(&request, format!("variable {}/{}", task, name)).await.map(|_| ())
            })
            .await
    }

    async fn read_file(&self, directory: &str, filename: &str) -> Result<Option<Vec<u8>>> {
        match self.session.execute_raw(&resources::read_file(directory, filename)).await {
            Ok(raw) => Ok(Some(raw.bytes)),
            Err(RwsError::Transport { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn upload_file(&self, directory: &str, filename: &str, contents: &[u8]) -> Result<()> {
        info!("Uploading {} bytes to {}/{}", contents.len(), directory, filename);
        self.session
            .execute_raw(&resources::upload_file(directory, filename, contents.to_vec()))
            .await
            .map(|_| ())
    }

    async fn delete_file(&self, directory: &str, filename: &str) -> Result<()> {
        self.session
            .execute_raw(&resources::delete_file(directory, filename))
            .await
            .map(|_| ())
            .map_err(|e| not_found(e, format!("file {}/{}", directory, filename)))
    }

    async fn get_ramdisk_path(&self) -> Result<String> {
        marshal::ramdisk_path(self.session.execute(&resources::ramdisk_path()).await?)
    }

    async fn read_event_log(&self, domain: u32) -> Result<Vec<EventLogEntry>> {
        let body = self
            .fetch(&resources::event_log(domain), format!("event log domain {}", domain))
            .await?;
        marshal::event_log(body)
    }

    async fn get_tasks(&self) -> Result<Vec<TaskState>> {
        marshal::tasks(self.session.execute(&resources::tasks()).await?)
    }

    async fn activate_task(&self, task: &str) -> Result<()> {
        info!("Activating task {}", task);
        self.fetch(&resources::activate_task(task), format!("task {}", task))
            .await
            .map(|_| ())
    }

    async fn deactivate_task(&self, task: &str) -> Result<()> {
        info!("Deactivating task {}", task);
        self.fetch(&resources::deactivate_task(task), format!("task {}", task))
            .await
            .map(|_| ())
    }

    async fn get_jointtarget(&self, task: &str) -> Result<JointTarget> {
        let body = self.fetch(&resources::joint_target(task), format!("task {}", task)).await?;
        marshal::joint_target(body)
    }

    async fn get_robtarget(&self, mechunit: &str, tool: &str, wobj: &str, coordinate: Coordinate) -> Result<RobTarget> {
        let request = resources::rob_target(mechunit, tool, wobj, coordinate);
        let body = self.fetch(&request, format!("mechunit {}", mechunit)).await?;
        marshal::rob_target(body)
    }

    async fn request_mastership(&self) -> Result<()> {
        self.mastership.request(&self.session).await
    }

    async fn release_mastership(&self) -> Result<()> {
        self.mastership.release(&self.session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastership::MastershipState;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RwsClient {
        RwsClient::new(Session::builder(&server.uri(), "Default User", "robotics").build().unwrap())
    }

    async fn mount_mastership(server: &MockServer) {
        for route in ["/rw/mastership/request", "/rw/mastership/release"] {
            Mock::given(method("POST"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(server)
                .await;
        }
    }

    fn signal_body(lvalue: &str) -> Value {
        json!({"_embedded": {"resources": [{"_type": "ios-signal-li", "name": "Auto", "lvalue": lvalue}]}})
    }

    fn task(name: &str, active: &str) -> Value {
        json!({
            "_type": "rap-task-li", "name": name, "type": "normal", "taskstate": "linked",
            "excstate": "ready", "active": active, "motiontask": "TRUE"
        })
    }

    #[tokio::test]
    async fn test_variable_write_scoped_by_mastership() {
        let server = MockServer::start().await;
        mount_mastership(&server).await;
        Mock::given(method("POST"))
            .and(path("/rw/rapid/symbol/RAPID/T_ROB1/test_num/data"))
            .and(body_string_contains("value=42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.set_rapid_variable_num("T_ROB1", "test_num", 42.0).await.unwrap();
        assert_eq!(client.mastership().state().await, MastershipState::Released);
    }

    #[tokio::test]
    async fn test_failed_variable_write_still_releases() {
        let server = MockServer::start().await;
        mount_mastership(&server).await;
        Mock::given(method("POST"))
            .and(path("/rw/rapid/symbol/RAPID/T_ROB1/test_num/data"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad value"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.set_rapid_variable("T_ROB1", "test_num", "oops").await.unwrap_err();
        assert!(matches!(err, RwsError::Transport { status: 400, .. }));
        assert_eq!(client.mastership().state().await, MastershipState::Released);
    }

    #[tokio::test]
    async fn test_timed_out_variable_write_releases_mastership() {
        let server = MockServer::start().await;
        mount_mastership(&server).await;
        Mock::given(method("POST"))
            .and(path("/rw/rapid/symbol/RAPID/T_ROB1/test_num/data"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let write = client.set_rapid_variable_num("T_ROB1", "test_num", 1.0);
        assert!(tokio::time::timeout(Duration::from_millis(100), write).await.is_err());

        for _ in 0..50 {
            if client.mastership().state().await == MastershipState::Released {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(client.mastership().state().await, MastershipState::Released);
    }

    #[tokio::test]
    async fn test_variable_read_and_missing_variable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rw/rapid/symbol/RAPID/T_ROB1/test_num/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": [{"_type": "rap-data", "value": "42"}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rw/rapid/symbol/RAPID/T_ROB1/missing/data"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_rapid_variable_num("T_ROB1", "test_num").await.unwrap(), 42.0);
        let err = client.get_rapid_variable("T_ROB1", "missing").await.unwrap_err();
        assert!(matches!(err, RwsError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_bare_and_qualified_signal_reads_agree() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rw/iosystem/signals/Auto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(signal_body("1")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rw/iosystem/signals/IntBus/IoPanel/Auto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(signal_body("1")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let bare = client.get_digital_io(&SignalAddress::bare("Auto")).await.unwrap();
        let qualified = client
            .get_digital_io(&SignalAddress::qualified("IntBus", "IoPanel", "Auto"))
            .await
            .unwrap();
        assert_eq!(bare, qualified);
    }

    #[tokio::test]
    async fn test_bare_signal_write_uses_default_location() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rw/iosystem/signals/Local/DRV_1/DO1"))
            .and(query_param("mastership", "implicit"))
            .and(body_string_contains("lvalue=1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.set_digital_io(&SignalAddress::bare("DO1"), true).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_deactivates_tasks_outside_selection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rw/rapid/tasks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"_embedded": {"resources": [task("T_ROB1", "On"), task("T_ROB2", "Off")]}})),
            )
            .mount(&server)
            .await;
        for route in [
            "/rw/rapid/tasks/T_ROB1/deactivate",
            "/rw/rapid/tasks/T_ROB2/activate",
            "/rw/rapid/execution/start",
        ] {
            Mock::given(method("POST"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/rw/rapid/tasks/T_ROB1/activate"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.start(Cycle::Once, &["T_ROB2"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_file_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fileservice/$HOME/motion_program_exec.mod"))
            .respond_with(ResponseTemplate::new(200).set_body_string("MODULE motion_program_exec\nENDMODULE\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fileservice/$HOME/missing.mod"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client.read_file_str("$HOME", "motion_program_exec.mod").await.unwrap().unwrap();
        assert!(text.starts_with("MODULE"));
        assert_eq!(client.read_file("$HOME", "missing.mod").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_files_and_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fileservice/$HOME"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_embedded": {"resources": [
                {"_type": "fs-file", "_title": "motion_program_exec.mod"}
            ]}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fileservice/$HOME/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rw/rapid/symbols/search"))
            .and(body_string_contains("blockurl=RAPID%2FT_ROB1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_embedded": {"_state": [
                {"_type": "rap-symproppers", "name": "test_num", "symburl": "RAPID/T_ROB1/user/test_num", "dattyp": "num"}
            ]}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.list_files("$HOME").await.unwrap(), vec!["motion_program_exec.mod"]);
        assert!(matches!(client.list_files("$HOME/nope").await, Err(RwsError::UnknownResource(_))));
        let symbols = client.get_rapid_variables(Some("T_ROB1")).await.unwrap();
        assert_eq!(symbols[0].name, "test_num");
    }

    #[tokio::test]
    async fn test_rmmp_waits_for_grant() {
        let server = MockServer::start().await;
        let poll = |status: &str| {
            ResponseTemplate::new(200)
                .set_body_json(json!({"_embedded": {"_state": [{"_type": "user-rmmp-poll", "status": status}]}}))
        };
        Mock::given(method("POST"))
            .and(path("/users/rmmp"))
            .and(body_string_contains("privilege=modify"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/rmmp/poll"))
            .respond_with(poll("PENDING"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/rmmp/poll"))
            .respond_with(poll("GRANTED"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.request_rmmp(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rmmp_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/rmmp"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/rmmp/poll"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"_embedded": {"_state": [{"_type": "user-rmmp-poll", "status": "DENIED"}]}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.request_rmmp(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_mastership_denial());
    }

    #[tokio::test]
    async fn test_create_existing_ipc_queue_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rw/dipc/create"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"status": {"code": -1073445879, "msg": "queue exists"}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(!client.try_create_ipc_queue("PC_QUEUE", 4440, 444).await.unwrap());
    }

    #[tokio::test]
    async fn test_speed_ratio_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rw/panel/speedratio"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"state": [{"_type": "pnl-speedratio", "speedratio": "50"}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rw/panel/speedratio"))
            .and(body_string_contains("speed-ratio=50"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.set_speed_ratio(50).await.unwrap();
        assert_eq!(client.get_speed_ratio().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_out_of_range_speed_ratio_never_sent() {
        // Nothing listens here; a request would surface as Connectivity.
        let client = RwsClient::new(Session::builder("http://127.0.0.1:9", "u", "p").build().unwrap());
        let err = client.set_speed_ratio(150).await.unwrap_err();
        assert!(matches!(err, RwsError::Validation(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_subscription_without_poll_url_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscription"))
            .respond_with(ResponseTemplate::new(201).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = SubscriptionRequest::new(
            crate::subscription::SubscriptionResource::ControllerState,
            crate::subscription::Priority::Low,
        )
        .unwrap();
        let err = client.subscribe(vec![request]).await.err().unwrap();
        assert!(matches!(err, RwsError::MalformedResponse(_)));
    }
}
