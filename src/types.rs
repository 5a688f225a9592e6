//! Typed domain records produced by the response marshaller
//!
//! All records are plain values built fresh from each response. Angles and
//! lengths are kept in the controller's units (degrees, millimetres).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Result, RwsError};

/// RAPID execution cycle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cycle {
    #[default]
    AsIs,
    Once,
    Forever,
}

impl Cycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cycle::AsIs => "asis",
            Cycle::Once => "once",
            Cycle::Forever => "forever",
        }
    }
}

impl FromStr for Cycle {
    type Err = RwsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asis" => Ok(Cycle::AsIs),
            "once" => Ok(Cycle::Once),
            "forever" => Ok(Cycle::Forever),
            other => Err(RwsError::Validation(format!(
                "unknown cycle mode '{}', expected asis, once or forever",
                other
            ))),
        }
    }
}

/// Motor state that may be requested through `rw/panel/ctrl-state`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    On,
    Off,
}

impl MotorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotorState::On => "motoron",
            MotorState::Off => "motoroff",
        }
    }
}

/// Coordinate system used when computing a robtarget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coordinate {
    #[default]
    Base,
    World,
    Tool,
    Wobj,
}

impl Coordinate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Coordinate::Base => "Base",
            Coordinate::World => "World",
            Coordinate::Tool => "Tool",
            Coordinate::Wobj => "Wobj",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionState {
    pub ctrlexecstate: String,
    pub cycle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskState {
    pub name: String,
    pub task_type: String,
    pub taskstate: String,
    pub excstate: String,
    pub active: bool,
    pub motiontask: bool,
}

/// An IO signal as read from the controller.
///
/// `lvalue` is the wire string; typed access goes through
/// [`Signal::digital`] and [`Signal::analog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub name: String,
    pub network: Option<String>,
    pub unit: Option<String>,
    pub lvalue: String,
}

impl Signal {
    pub fn digital(&self) -> Result<u8> {
        match self.lvalue.trim() {
            "0" => Ok(0),
            "1" => Ok(1),
            other => Err(RwsError::malformed(format!(
                "signal {} has non-digital value '{}'",
                self.name, other
            ))),
        }
    }

    pub fn analog(&self) -> Result<f64> {
        self.lvalue.trim().parse::<f64>().map_err(|_| {
            RwsError::malformed(format!("signal {} has non-numeric value '{}'", self.name, self.lvalue))
        })
    }
}

/// A RAPID persistent variable, value kept in its string encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RapidVariable {
    pub task: Option<String>,
    pub name: String,
    pub value: String,
}

impl RapidVariable {
    /// Qualified key in `task/name` form.
    pub fn key(&self) -> String {
        match &self.task {
            Some(task) => format!("{}/{}", task, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointTarget {
    pub robax: [f64; 6],
    pub extax: [f64; 6],
}

impl Default for JointTarget {
    fn default() -> Self {
        Self {
            robax: [0.0; 6],
            extax: [0.0; 6],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RobTarget {
    pub trans: [f64; 3],
    pub rot: [f64; 4],
    pub robconf: [i32; 4],
    pub extax: [f64; 6],
}

impl Default for RobTarget {
    fn default() -> Self {
        Self {
            trans: [0.0; 3],
            rot: [1.0, 0.0, 0.0, 0.0],
            robconf: [0; 4],
            extax: [0.0; 6],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogEntry {
    pub seqnum: u64,
    pub msgtype: i32,
    pub code: i64,
    pub tstamp: NaiveDateTime,
    pub argc: usize,
    pub args: Vec<String>,
    pub title: String,
    pub desc: String,
    pub conseqs: String,
    pub causes: String,
    pub actions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpcMessage {
    pub data: String,
    pub userdef: String,
    pub msgtype: String,
    pub cmd: String,
    pub queue_name: String,
}

/// Outgoing IPC message for `rw/dipc/{queue}/send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcSend {
    pub source_queue: String,
    pub data: String,
    pub cmd: i32,
    pub userdef: i32,
    pub msgtype: i32,
}

impl IpcSend {
    pub fn new(source_queue: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            source_queue: source_queue.into(),
            data: data.into(),
            cmd: 111,
            userdef: 1,
            msgtype: 1,
        }
    }
}

/// State of an IPC queue as reported by `rw/dipc/{queue}`. Fields other
/// than the name are passed through as the controller spells them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpcQueueInfo {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

/// A RAPID symbol found by a symbol search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RapidSymbol {
    pub name: String,
    /// Full symbol path, e.g. `RAPID/T_ROB1/user/reg1`.
    pub symburl: String,
    pub symtyp: Option<String>,
    pub dattyp: Option<String>,
}

/// Answer to a remote mastering poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RmmpStatus {
    Pending,
    Granted,
    /// Anything else; the operator refused or the grant lapsed.
    Other(String),
}

/// Address of an IO signal. Network and unit are optional; without both
/// the controller is asked to resolve the bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalAddress {
    pub name: String,
    pub network: Option<String>,
    pub unit: Option<String>,
}

impl SignalAddress {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: None,
            unit: None,
        }
    }

    pub fn qualified(network: impl Into<String>, unit: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: Some(network.into()),
            unit: Some(unit.into()),
        }
    }

    /// Network and unit, when both are known.
    pub fn location(&self) -> Option<(&str, &str)> {
        match (self.network.as_deref(), self.unit.as_deref()) {
            (Some(n), Some(u)) if !n.is_empty() && !u.is_empty() => Some((n, u)),
            _ => None,
        }
    }
}

impl fmt::Display for SignalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some((network, unit)) => write!(f, "{}/{}/{}", network, unit, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
