//! In-memory controller for offline use
//!
//! `MockController` keeps its state in memory and implements
//! [`RobotWebServices`], so code written against the trait can be exercised
//! without a controller. It starts out looking like a freshly booted
//! controller in automatic mode with one motion task.

use async_trait::async_trait;
use chrono::Local;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::interface::RobotWebServices;
use crate::mastership::MastershipState;
use crate::types::{
    Coordinate, Cycle, EventLogEntry, ExecutionState, JointTarget, MotorState, RobTarget, SignalAddress, TaskState,
};
use crate::{Result, RwsError};

const DEFAULT_MODULE: &[u8] = b"MODULE motion_program_exec\nENDMODULE\n";

#[derive(Debug)]
struct MockState {
    exec_state: String,
    cycle: Cycle,
    speed_ratio: u8,
    controller_state: MotorState,
    opmode: String,
    tasks: Vec<TaskState>,
    digital: HashMap<String, u8>,
    analog: HashMap<String, f64>,
    rapid: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    event_log: Vec<EventLogEntry>,
    mastership: MastershipState,
}

impl Default for MockState {
    fn default() -> Self {
        let digital = [("Auto", 1), ("motion_program_error", 0), ("motion_program_log_motion", 0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let analog = [("motion_program_preempt".to_string(), 0.0)].into_iter().collect();
        let rapid = [("T_ROB1/MOTION_PROGRAM_CMD_MOVEL", "3"), ("T_ROB1/test_num", "0")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let files = ["$HOME/motion_program_exec.mod", "/TEMP/motion_program_exec.mod"]
            .into_iter()
            .map(|k| (k.to_string(), DEFAULT_MODULE.to_vec()))
            .collect();

        Self {
            exec_state: "stopped".to_string(),
            cycle: Cycle::Forever,
            speed_ratio: 100,
            controller_state: MotorState::Off,
            opmode: "AUTO".to_string(),
            tasks: vec![mock_task("T_ROB1", true, true)],
            digital,
            analog,
            rapid,
            files,
            event_log: vec![EventLogEntry {
                seqnum: 1,
                msgtype: 1,
                code: 0,
                tstamp: Local::now().naive_local(),
                argc: 0,
                args: Vec::new(),
                title: "Mock event".to_string(),
                desc: "This is a mock event log entry".to_string(),
                conseqs: String::new(),
                causes: String::new(),
                actions: String::new(),
            }],
            mastership: MastershipState::Released,
        }
    }
}

/// A task record as the mock reports it.
pub fn mock_task(name: &str, active: bool, motiontask: bool) -> TaskState {
    TaskState {
        name: name.to_string(),
        task_type: "NORMAL".to_string(),
        taskstate: "ready".to_string(),
        excstate: "stopped".to_string(),
        active,
        motiontask,
    }
}

#[derive(Debug, Default)]
pub struct MockController {
    state: Mutex<MockState>,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a task.
    pub fn with_task(mut self, task: TaskState) -> Self {
        let state = self.state.get_mut();
        state.tasks.retain(|t| t.name != task.name);
        state.tasks.push(task);
        self
    }

    pub async fn mastership_state(&self) -> MastershipState {
        self.state.lock().await.mastership
    }
}

fn variable_key(task: &str, name: &str) -> String {
    if task.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", task, name)
    }
}

fn file_key(directory: &str, filename: &str) -> String {
    if directory.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", directory.trim_end_matches('/'), filename.trim_start_matches('/'))
    }
}

fn rejected(reason: &str) -> RwsError {
    RwsError::Validation(reason.to_string())
}

#[async_trait]
impl RobotWebServices for MockController {
    async fn start_execution(&self, cycle: Cycle) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.controller_state != MotorState::On {
            return Err(rejected("cannot start execution: controller is not in motoron state"));
        }
        state.exec_state = "running".to_string();
        state.cycle = cycle;
        debug!("Mock execution started ({})", cycle.as_str());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.state.lock().await.exec_state = "stopped".to_string();
        Ok(())
    }

    async fn resetpp(&self) -> Result<()> {
        Ok(())
    }

    async fn get_execution_state(&self) -> Result<ExecutionState> {
        let state = self.state.lock().await;
        Ok(ExecutionState {
            ctrlexecstate: state.exec_state.clone(),
            cycle: state.cycle.as_str().to_string(),
        })
    }

    async fn get_controller_state(&self) -> Result<String> {
        Ok(self.state.lock().await.controller_state.as_str().to_string())
    }

    async fn set_controller_state(&self, motors: MotorState) -> Result<()> {
        self.state.lock().await.controller_state = motors;
        Ok(())
    }

    async fn get_operation_mode(&self) -> Result<String> {
        Ok(self.state.lock().await.opmode.clone())
    }

    async fn get_speed_ratio(&self) -> Result<u8> {
        Ok(self.state.lock().await.speed_ratio)
    }

    async fn set_speed_ratio(&self, ratio: u8) -> Result<()> {
        if ratio > 100 {
            return Err(rejected("speed ratio must be 0..100"));
        }
        self.state.lock().await.speed_ratio = ratio;
        Ok(())
    }

    // Signals are keyed by name, so bare and qualified addresses agree.

    async fn get_digital_io(&self, signal: &SignalAddress) -> Result<u8> {
        self.state
            .lock()
            .await
            .digital
            .get(&signal.name)
            .copied()
            .ok_or_else(|| RwsError::UnknownResource(format!("signal {}", signal)))
    }

    async fn set_digital_io(&self, signal: &SignalAddress, value: bool) -> Result<()> {
        self.state.lock().await.digital.insert(signal.name.clone(), u8::from(value));
        Ok(())
    }

    async fn get_analog_io(&self, signal: &SignalAddress) -> Result<f64> {
        self.state
            .lock()
            .await
            .analog
            .get(&signal.name)
            .copied()
            .ok_or_else(|| RwsError::UnknownResource(format!("signal {}", signal)))
    }

    async fn set_analog_io(&self, signal: &SignalAddress, value: f64) -> Result<()> {
        self.state.lock().await.analog.insert(signal.name.clone(), value);
        Ok(())
    }

    async fn get_rapid_variable(&self, task: &str, name: &str) -> Result<String> {
        let key = variable_key(task, name);
        self.state
            .lock()
            .await
            .rapid
            .get(&key)
            .cloned()
            .ok_or_else(|| RwsError::UnknownResource(format!("variable {}", key)))
    }

    async fn set_rapid_variable(&self, task: &str, name: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.mastership = MastershipState::Held;
        state.rapid.insert(variable_key(task, name), value.to_string());
        state.mastership = MastershipState::Released;
        Ok(())
    }

    async fn read_file(&self, directory: &str, filename: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().await.files.get(&file_key(directory, filename)).cloned())
    }

    async fn upload_file(&self, directory: &str, filename: &str, contents: &[u8]) -> Result<()> {
        self.state
            .lock()
            .await
            .files
            .insert(file_key(directory, filename), contents.to_vec());
        Ok(())
    }

    async fn delete_file(&self, directory: &str, filename: &str) -> Result<()> {
        let key = file_key(directory, filename);
        match self.state.lock().await.files.remove(&key) {
            Some(_) => Ok(()),
            None => Err(RwsError::UnknownResource(format!("file {}", key))),
        }
    }

    async fn get_ramdisk_path(&self) -> Result<String> {
        Ok("/TEMP/".to_string())
    }

    async fn read_event_log(&self, domain: u32) -> Result<Vec<EventLogEntry>> {
        if domain != 0 {
            return Ok(Vec::new());
        }
        Ok(self.state.lock().await.event_log.clone())
    }

    async fn get_tasks(&self) -> Result<Vec<TaskState>> {
        Ok(self.state.lock().await.tasks.clone())
    }

    async fn activate_task(&self, task: &str) -> Result<()> {
        self.set_task_active(task, true).await
    }

    async fn deactivate_task(&self, task: &str) -> Result<()> {
        self.set_task_active(task, false).await
    }

    async fn get_jointtarget(&self, _task: &str) -> Result<JointTarget> {
        Ok(JointTarget::default())
    }

    async fn get_robtarget(
        &self,
        _mechunit: &str,
        _tool: &str,
        _wobj: &str,
        _coordinate: Coordinate,
    ) -> Result<RobTarget> {
        Ok(RobTarget::default())
    }

    async fn request_mastership(&self) -> Result<()> {
        self.state.lock().await.mastership = MastershipState::Held;
        Ok(())
    }

    async fn release_mastership(&self) -> Result<()> {
        self.state.lock().await.mastership = MastershipState::Released;
        Ok(())
    }
}

impl MockController {
    async fn set_task_active(&self, task: &str, active: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .tasks
            .iter_mut()
            .find(|t| t.name == task)
            .ok_or_else(|| RwsError::UnknownResource(format!("task {}", task)))?;
        entry.active = active;
        Ok(())
    }
}
