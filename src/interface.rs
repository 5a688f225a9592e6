//! Capability interface shared by every RWS implementation
//!
//! Code written against [`RobotWebServices`] runs unchanged on a live
//! controller ([`crate::RwsClient`]) or offline ([`crate::MockController`]).

use async_trait::async_trait;

use crate::types::{
    Coordinate, Cycle, EventLogEntry, ExecutionState, JointTarget, MotorState, RobTarget, SignalAddress, TaskState,
};
use crate::{Result, RwsError};

/// Trait for controlling and observing a robot controller
#[async_trait]
pub trait RobotWebServices: Send + Sync {
    // Execution control

    /// Start RAPID execution on the currently active tasks.
    async fn start_execution(&self, cycle: Cycle) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Reset the program pointer to main.
    async fn resetpp(&self) -> Result<()>;

    async fn get_execution_state(&self) -> Result<ExecutionState>;

    // Panel

    async fn get_controller_state(&self) -> Result<String>;

    async fn set_controller_state(&self, state: MotorState) -> Result<()>;

    async fn get_operation_mode(&self) -> Result<String>;

    async fn get_speed_ratio(&self) -> Result<u8>;

    async fn set_speed_ratio(&self, ratio: u8) -> Result<()>;

    // IO

    async fn get_digital_io(&self, signal: &SignalAddress) -> Result<u8>;

    async fn set_digital_io(&self, signal: &SignalAddress, value: bool) -> Result<()>;

    async fn get_analog_io(&self, signal: &SignalAddress) -> Result<f64>;

    async fn set_analog_io(&self, signal: &SignalAddress, value: f64) -> Result<()>;

    // RAPID variables, always in their string encoding

    async fn get_rapid_variable(&self, task: &str, name: &str) -> Result<String>;

    async fn set_rapid_variable(&self, task: &str, name: &str, value: &str) -> Result<()>;

    // Files

    /// Read a file. `Ok(None)` when it does not exist.
    async fn read_file(&self, directory: &str, filename: &str) -> Result<Option<Vec<u8>>>;

    async fn upload_file(&self, directory: &str, filename: &str, contents: &[u8]) -> Result<()>;

    async fn delete_file(&self, directory: &str, filename: &str) -> Result<()>;

    async fn get_ramdisk_path(&self) -> Result<String>;

    // Event log

    async fn read_event_log(&self, domain: u32) -> Result<Vec<EventLogEntry>>;

    // Tasks and geometry

    async fn get_tasks(&self) -> Result<Vec<TaskState>>;

    async fn activate_task(&self, task: &str) -> Result<()>;

    async fn deactivate_task(&self, task: &str) -> Result<()>;

    async fn get_jointtarget(&self, task: &str) -> Result<JointTarget>;

    async fn get_robtarget(&self, mechunit: &str, tool: &str, wobj: &str, coordinate: Coordinate) -> Result<RobTarget>;

    // Mastership

    async fn request_mastership(&self) -> Result<()>;

    async fn release_mastership(&self) -> Result<()>;

    /// Make exactly `tasks` the active motion tasks.
    ///
    /// Every requested task must exist. Motion tasks in the set are activated
    /// if inactive, motion tasks outside it are deactivated if active. Tasks
    /// that are not motion tasks are left alone.
    async fn select_motion_tasks(&self, tasks: &[&str]) -> Result<()> {
        let all = self.get_tasks().await?;
        if let Some(missing) = tasks.iter().find(|name| !all.iter().any(|t| t.name == **name)) {
            return Err(RwsError::UnknownResource(format!("task {}", missing)));
        }

        for task in all.iter().filter(|t| t.motiontask) {
            let wanted = tasks.contains(&task.name.as_str());
            if wanted && !task.active {
                self.activate_task(&task.name).await?;
            } else if !wanted && task.active {
                self.deactivate_task(&task.name).await?;
            }
        }
        Ok(())
    }

    /// Select the motion tasks, then start execution.
    async fn start(&self, cycle: Cycle, tasks: &[&str]) -> Result<()> {
        self.select_motion_tasks(tasks).await?;
        self.start_execution(cycle).await
    }

    async fn set_motors_on(&self) -> Result<()> {
        self.set_controller_state(MotorState::On).await
    }

    async fn set_motors_off(&self) -> Result<()> {
        self.set_controller_state(MotorState::Off).await
    }
}
