//! Resource model: logical RWS operations as (verb, path, query, payload)
//!
//! Nothing here touches the network. Each constructor returns an
//! [`RwsRequest`] that the session executes. Single-shot mutations carry the
//! `mastership=implicit` flag; variable writes do not, because the client
//! wraps them in an explicit request/release scope.

use crate::types::{Coordinate, Cycle, IpcSend, MotorState};

pub const IMPLICIT_MASTERSHIP: (&str, &str) = ("mastership", "implicit");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Form(Vec<(String, String)>),
    Raw { content_type: &'static str, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RwsRequest {
    pub verb: Verb,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
}

impl RwsRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            verb: Verb::Get,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            verb: Verb::Post,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn form(mut self, key: &str, value: impl Into<String>) -> Self {
        let pair = (key.to_string(), value.into());
        match &mut self.body {
            Body::Form(fields) => fields.push(pair),
            _ => self.body = Body::Form(vec![pair]),
        }
        self
    }

    pub fn implicit_mastership(self) -> Self {
        self.query(IMPLICIT_MASTERSHIP.0, IMPLICIT_MASTERSHIP.1)
    }

    /// Anything but a GET changes controller state.
    pub fn is_mutating(&self) -> bool {
        self.verb != Verb::Get
    }

    #[cfg(test)]
    pub(crate) fn has_implicit_mastership(&self) -> bool {
        self.query
            .iter()
            .any(|(k, v)| k == IMPLICIT_MASTERSHIP.0 && v == IMPLICIT_MASTERSHIP.1)
    }

    #[cfg(test)]
    pub(crate) fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            Body::Form(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

/// Percent-encode one path segment. `$` is left alone so controller
/// volumes such as `$HOME` keep their spelling.
pub fn segment(raw: &str) -> String {
    urlencoding::encode(raw).replace("%24", "$")
}

/// Encode a slash-separated relative path segment by segment.
fn segments(raw: &str) -> String {
    raw.split('/')
        .filter(|s| !s.is_empty())
        .map(segment)
        .collect::<Vec<_>>()
        .join("/")
}

// Execution control

pub fn execution_start(cycle: Cycle) -> RwsRequest {
    RwsRequest::post("rw/rapid/execution/start")
        .implicit_mastership()
        .form("regain", "continue")
        .form("execmode", "continue")
        .form("cycle", cycle.as_str())
        .form("condition", "none")
        .form("stopatbp", "disabled")
        .form("alltaskbytsp", "true")
}

pub fn execution_stop() -> RwsRequest {
    RwsRequest::post("rw/rapid/execution/stop")
        .implicit_mastership()
        .form("stopmode", "stop")
}

pub fn reset_program_pointer() -> RwsRequest {
    RwsRequest::post("rw/rapid/execution/resetpp").implicit_mastership()
}

pub fn execution_state() -> RwsRequest {
    RwsRequest::get("rw/rapid/execution")
}

// Tasks

pub fn tasks() -> RwsRequest {
    RwsRequest::get("rw/rapid/tasks")
}

pub fn activate_task(task: &str) -> RwsRequest {
    RwsRequest::post(format!("rw/rapid/tasks/{}/activate", segment(task))).implicit_mastership()
}

pub fn deactivate_task(task: &str) -> RwsRequest {
    RwsRequest::post(format!("rw/rapid/tasks/{}/deactivate", segment(task))).implicit_mastership()
}

pub fn joint_target(task: &str) -> RwsRequest {
    RwsRequest::get(format!("rw/rapid/tasks/{}/motion/jointtarget", segment(task)))
}

pub fn rob_target(mechunit: &str, tool: &str, wobj: &str, coordinate: Coordinate) -> RwsRequest {
    RwsRequest::get(format!("rw/motionsystem/mechunits/{}/robtarget", segment(mechunit)))
        .query("tool", tool)
        .query("wobj", wobj)
        .query("coordinate", coordinate.as_str())
}

// Panel

pub fn controller_state() -> RwsRequest {
    RwsRequest::get("rw/panel/ctrl-state")
}

pub fn set_controller_state(state: MotorState) -> RwsRequest {
    RwsRequest::post("rw/panel/ctrl-state")
        .implicit_mastership()
        .form("ctrl-state", state.as_str())
}

pub fn operation_mode() -> RwsRequest {
    RwsRequest::get("rw/panel/opmode")
}

pub fn speed_ratio() -> RwsRequest {
    RwsRequest::get("rw/panel/speedratio")
}

pub fn set_speed_ratio(ratio: u8) -> RwsRequest {
    RwsRequest::post("rw/panel/speedratio")
        .implicit_mastership()
        .form("speed-ratio", ratio.to_string())
}

// IO

/// Signal lookup. With both network and unit the fully qualified path is
/// used, otherwise the bare signal name.
pub fn signal(name: &str, location: Option<(&str, &str)>) -> RwsRequest {
    match location {
        Some((network, unit)) => RwsRequest::get(signal_path(network, unit, name)),
        None => RwsRequest::get(format!("rw/iosystem/signals/{}", segment(name))),
    }
}

pub fn set_digital_signal(network: &str, unit: &str, name: &str, value: bool) -> RwsRequest {
    RwsRequest::post(signal_path(network, unit, name))
        .implicit_mastership()
        .form("lvalue", if value { "1" } else { "0" })
}

pub fn set_analog_signal(network: &str, unit: &str, name: &str, value: f64) -> RwsRequest {
    RwsRequest::post(signal_path(network, unit, name))
        .implicit_mastership()
        .form("mode", "value")
        .form("lvalue", value.to_string())
}

fn signal_path(network: &str, unit: &str, name: &str) -> String {
    format!(
        "rw/iosystem/signals/{}/{}/{}",
        segment(network),
        segment(unit),
        segment(name)
    )
}

// RAPID variables

pub fn rapid_variable_path(task: &str, var: &str) -> String {
    format!("rw/rapid/symbol/RAPID/{}/{}/data", segment(task), segment(var))
}

pub fn rapid_variable(task: &str, var: &str) -> RwsRequest {
    RwsRequest::get(rapid_variable_path(task, var))
}

/// Variable write. Mastership is held explicitly around this request.
pub fn set_rapid_variable(task: &str, var: &str, value: &str) -> RwsRequest {
    RwsRequest::post(rapid_variable_path(task, var)).form("value", value)
}

/// Persistent symbols under a task, or under all of RAPID when `task` is `None`.
pub fn search_persistent_symbols(task: Option<&str>) -> RwsRequest {
    let blockurl = match task {
        Some(task) => format!("RAPID/{}", task),
        None => "RAPID".to_string(),
    };
    RwsRequest::post("rw/rapid/symbols/search")
        .form("view", "block")
        .form("vartyp", "any")
        .form("blockurl", blockurl)
        .form("symtyp", "per")
        .form("recursive", "true")
        .form("skipshared", "FALSE")
        .form("onlyused", "FALSE")
        .form("stack", "0")
        .form("posl", "0")
        .form("posc", "0")
}

// Files

pub fn file_path(directory: &str, filename: &str) -> String {
    let directory = segments(directory);
    let filename = segments(filename);
    if directory.is_empty() {
        format!("fileservice/{}", filename)
    } else {
        format!("fileservice/{}/{}", directory, filename)
    }
}

pub fn read_file(directory: &str, filename: &str) -> RwsRequest {
    RwsRequest::get(file_path(directory, filename))
}

pub fn list_directory(directory: &str) -> RwsRequest {
    RwsRequest::get(format!("fileservice/{}", segments(directory)))
}

pub fn upload_file(directory: &str, filename: &str, contents: Vec<u8>) -> RwsRequest {
    RwsRequest {
        verb: Verb::Put,
        path: file_path(directory, filename),
        query: Vec::new(),
        body: Body::Raw {
            content_type: "text/plain;v=2.0",
            bytes: contents,
        },
    }
}

pub fn delete_file(directory: &str, filename: &str) -> RwsRequest {
    RwsRequest {
        verb: Verb::Delete,
        path: file_path(directory, filename),
        query: Vec::new(),
        body: Body::Empty,
    }
}

pub fn ramdisk_path() -> RwsRequest {
    RwsRequest::get("ctrl/$RAMDISK")
}

// Event log

pub fn event_log(domain: u32) -> RwsRequest {
    RwsRequest::get(format!("rw/elog/{}/", domain)).query("lang", "en")
}

// IPC

pub fn ipc_read(queue: &str, timeout_secs: f64) -> RwsRequest {
    RwsRequest::get(format!("rw/dipc/{}/{}", segment(queue), timeout_secs))
}

pub fn ipc_send(target_queue: &str, message: &IpcSend) -> RwsRequest {
    RwsRequest::post(format!("rw/dipc/{}/send", segment(target_queue)))
        .form("dipc-src-queue-name", message.source_queue.clone())
        .form("dipc-cmd", message.cmd.to_string())
        .form("dipc-userdef", message.userdef.to_string())
        .form("dipc-msgtype", message.msgtype.to_string())
        .form("dipc-data", message.data.clone())
}

pub fn ipc_queue(queue: &str) -> RwsRequest {
    RwsRequest::get(format!("rw/dipc/{}", segment(queue)))
}

pub fn ipc_create(queue: &str, queue_size: u32, max_msg_size: u32) -> RwsRequest {
    RwsRequest::post("rw/dipc/create")
        .form("dipc-queue-name", queue)
        .form("dipc-queue-size", queue_size.to_string())
        .form("dipc-max-msg-size", max_msg_size.to_string())
}

// Mastership and session

pub fn mastership_request() -> RwsRequest {
    RwsRequest::post("rw/mastership/request")
}

pub fn mastership_release() -> RwsRequest {
    RwsRequest::post("rw/mastership/release")
}

/// Ask the pendant operator for remote mastering (RMMP).
pub fn rmmp_request() -> RwsRequest {
    RwsRequest::post("users/rmmp").form("privilege", "modify")
}

pub fn rmmp_poll() -> RwsRequest {
    RwsRequest::get("users/rmmp/poll")
}

pub fn logout() -> RwsRequest {
    RwsRequest::get("logout")
}
