//! Response marshalling: RWS envelopes into typed records
//!
//! RWS 2.0 answers with two envelope shapes:
//! - singleton: `{"state": [ {...} ]}`
//! - collection: `{"_embedded": {"resources": [...]}}` or `{"_embedded": {"_state": [...]}}`
//!
//! Wire values are strings. They are converted to numbers only while building
//! the typed record, and a record is only built when every field converts.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::types::{
    EventLogEntry, ExecutionState, IpcMessage, IpcQueueInfo, JointTarget, RapidSymbol, RmmpStatus, RobTarget,
    Signal, SignalAddress, TaskState,
};
use crate::{Result, RwsError};

/// Timestamp layout used by the event log, e.g. `2024-03-01 T 14:22:05`.
pub const ELOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d T %H:%M:%S";

#[derive(Debug, Deserialize)]
struct StateEnvelope<T> {
    state: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CollectionEnvelope {
    #[serde(rename = "_embedded")]
    embedded: Embedded,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default)]
    resources: Vec<Value>,
    #[serde(default, rename = "_state")]
    state: Vec<Value>,
}

impl Embedded {
    fn entries(self) -> Vec<Value> {
        if self.resources.is_empty() {
            self.state
        } else {
            self.resources
        }
    }
}

fn require(body: Option<Value>, what: &str) -> Result<Value> {
    body.ok_or_else(|| RwsError::malformed(format!("{}: empty response", what)))
}

/// First record of a singleton envelope.
pub fn singleton<T: DeserializeOwned>(body: Option<Value>, what: &str) -> Result<T> {
    let envelope: StateEnvelope<T> = serde_json::from_value(require(body, what)?)
        .map_err(|e| RwsError::malformed(format!("{}: {}", what, e)))?;
    envelope
        .state
        .into_iter()
        .next()
        .ok_or_else(|| RwsError::malformed(format!("{}: state is empty", what)))
}

/// Entries of a collection envelope. An empty body is an empty collection.
pub fn collection(body: Option<Value>, what: &str) -> Result<Vec<Value>> {
    let Some(body) = body else {
        return Ok(Vec::new());
    };
    let envelope: CollectionEnvelope =
        serde_json::from_value(body).map_err(|e| RwsError::malformed(format!("{}: {}", what, e)))?;
    Ok(envelope.embedded.entries())
}

fn decimal(field: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| RwsError::malformed(format!("{} is not a number: '{}'", field, raw)))
}

fn integer<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| RwsError::malformed(format!("{} is not an integer: '{}'", field, raw)))
}

/// Configuration flags sometimes arrive as `"1.0"`; accept integral decimals.
fn config_flag(field: &str, raw: &str) -> Result<i32> {
    if let Ok(v) = raw.trim().parse::<i32>() {
        return Ok(v);
    }
    let v = decimal(field, raw)?;
    if v.fract() == 0.0 && v.abs() <= i32::MAX as f64 {
        Ok(v as i32)
    } else {
        Err(RwsError::malformed(format!("{} is not an integer: '{}'", field, raw)))
    }
}

fn flag(field: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(RwsError::malformed(format!("{} is not a flag: '{}'", field, raw))),
    }
}

// Panel, execution and ramdisk

#[derive(Debug, Deserialize)]
struct ExecutionRecord {
    ctrlexecstate: String,
    cycle: String,
}

pub fn execution_state(body: Option<Value>) -> Result<ExecutionState> {
    let record: ExecutionRecord = singleton(body, "execution state")?;
    Ok(ExecutionState {
        ctrlexecstate: record.ctrlexecstate,
        cycle: record.cycle,
    })
}

#[derive(Debug, Deserialize)]
struct ControllerStateRecord {
    ctrlstate: String,
}

pub fn controller_state(body: Option<Value>) -> Result<String> {
    singleton::<ControllerStateRecord>(body, "controller state").map(|r| r.ctrlstate)
}

#[derive(Debug, Deserialize)]
struct OpModeRecord {
    opmode: String,
}

pub fn operation_mode(body: Option<Value>) -> Result<String> {
    singleton::<OpModeRecord>(body, "operation mode").map(|r| r.opmode)
}

#[derive(Debug, Deserialize)]
struct SpeedRatioRecord {
    #[serde(rename = "_type")]
    kind: String,
    speedratio: String,
}

pub fn speed_ratio(body: Option<Value>) -> Result<u8> {
    let record: SpeedRatioRecord = singleton(body, "speed ratio")?;
    if record.kind != "pnl-speedratio" {
        return Err(RwsError::malformed(format!("unexpected speed ratio type '{}'", record.kind)));
    }
    let ratio = decimal("speedratio", &record.speedratio)?;
    if !(0.0..=100.0).contains(&ratio) {
        return Err(RwsError::malformed(format!("speed ratio {} out of range", ratio)));
    }
    Ok(ratio.round() as u8)
}

#[derive(Debug, Deserialize)]
struct ValueRecord {
    value: String,
}

pub fn ramdisk_path(body: Option<Value>) -> Result<String> {
    singleton::<ValueRecord>(body, "ramdisk path").map(|r| r.value)
}

pub fn rapid_variable(body: Option<Value>) -> Result<String> {
    singleton::<ValueRecord>(body, "rapid variable").map(|r| r.value)
}

#[derive(Debug, Deserialize)]
struct SymbolRecord {
    name: String,
    symburl: String,
    #[serde(default)]
    symtyp: Option<String>,
    #[serde(default)]
    dattyp: Option<String>,
}

/// Symbol search results. Entries without a name or URL are not symbols.
pub fn rapid_symbols(body: Option<Value>) -> Result<Vec<RapidSymbol>> {
    Ok(collection(body, "symbol search")?
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<SymbolRecord>(entry).ok())
        .map(|r| RapidSymbol {
            name: r.name,
            symburl: r.symburl,
            symtyp: r.symtyp,
            dattyp: r.dattyp,
        })
        .collect())
}

// Files

/// Names in a fileservice directory listing, from each entry's `_title`.
pub fn file_names(body: Option<Value>) -> Result<Vec<String>> {
    collection(body, "directory listing")?
        .into_iter()
        .map(|entry| {
            entry
                .get("_title")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RwsError::malformed("directory entry without _title"))
        })
        .collect()
}

// IO

#[derive(Debug, Deserialize)]
struct SignalRecord {
    #[serde(default)]
    name: Option<String>,
    lvalue: String,
}

/// Signal value from `_embedded.resources[0]`.
pub fn signal(body: Option<Value>, address: &SignalAddress) -> Result<Signal> {
    let first = collection(body, "signal")?
        .into_iter()
        .next()
        .ok_or_else(|| RwsError::UnknownResource(format!("signal {}", address)))?;
    let record: SignalRecord =
        serde_json::from_value(first).map_err(|e| RwsError::malformed(format!("signal {}: {}", address, e)))?;
    Ok(Signal {
        name: record.name.unwrap_or_else(|| address.name.clone()),
        network: address.network.clone(),
        unit: address.unit.clone(),
        lvalue: record.lvalue,
    })
}

// Tasks

#[derive(Debug, Deserialize)]
struct TaskRecord {
    name: String,
    #[serde(rename = "type")]
    task_type: String,
    taskstate: String,
    excstate: String,
    active: String,
    motiontask: String,
}

impl TaskRecord {
    fn into_state(self) -> Result<TaskState> {
        Ok(TaskState {
            active: flag("active", &self.active)?,
            motiontask: flag("motiontask", &self.motiontask)?,
            name: self.name,
            task_type: self.task_type,
            taskstate: self.taskstate,
            excstate: self.excstate,
        })
    }
}

/// Task listing. Entries that are not tasks or do not parse are skipped.
pub fn tasks(body: Option<Value>) -> Result<Vec<TaskState>> {
    let entries = collection(body, "tasks")?;
    let mut tasks = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.get("name").is_none() {
            continue;
        }
        let name = entry["name"].as_str().unwrap_or("<unknown>").to_string();
        match serde_json::from_value::<TaskRecord>(entry)
            .map_err(|e| RwsError::malformed(e.to_string()))
            .and_then(TaskRecord::into_state)
        {
            Ok(task) => tasks.push(task),
            Err(e) => warn!("Skipping task {}: {}", name, e),
        }
    }
    Ok(tasks)
}

// Geometry

#[derive(Debug, Deserialize)]
struct JointTargetRecord {
    rax_1: String,
    rax_2: String,
    rax_3: String,
    rax_4: String,
    rax_5: String,
    rax_6: String,
    eax_a: String,
    eax_b: String,
    eax_c: String,
    eax_d: String,
    eax_e: String,
    eax_f: String,
}

pub fn joint_target(body: Option<Value>) -> Result<JointTarget> {
    let r: JointTargetRecord = singleton(body, "jointtarget")?;
    Ok(JointTarget {
        robax: [
            decimal("rax_1", &r.rax_1)?,
            decimal("rax_2", &r.rax_2)?,
            decimal("rax_3", &r.rax_3)?,
            decimal("rax_4", &r.rax_4)?,
            decimal("rax_5", &r.rax_5)?,
            decimal("rax_6", &r.rax_6)?,
        ],
        extax: external_axes([&r.eax_a, &r.eax_b, &r.eax_c, &r.eax_d, &r.eax_e, &r.eax_f])?,
    })
}

#[derive(Debug, Deserialize)]
struct RobTargetRecord {
    x: String,
    y: String,
    z: String,
    q1: String,
    q2: String,
    q3: String,
    q4: String,
    cf1: String,
    cf4: String,
    cf6: String,
    cfx: String,
    eax_a: String,
    eax_b: String,
    eax_c: String,
    eax_d: String,
    eax_e: String,
    eax_f: String,
}

/// Robtarget. Translation, rotation, configuration and external axes must
/// all parse; a partial pose is never returned.
pub fn rob_target(body: Option<Value>) -> Result<RobTarget> {
    let r: RobTargetRecord = singleton(body, "robtarget")?;
    let trans = [decimal("x", &r.x)?, decimal("y", &r.y)?, decimal("z", &r.z)?];
    let rot = [
        decimal("q1", &r.q1)?,
        decimal("q2", &r.q2)?,
        decimal("q3", &r.q3)?,
        decimal("q4", &r.q4)?,
    ];
    let robconf = [
        config_flag("cf1", &r.cf1)?,
        config_flag("cf4", &r.cf4)?,
        config_flag("cf6", &r.cf6)?,
        config_flag("cfx", &r.cfx)?,
    ];
    let extax = external_axes([&r.eax_a, &r.eax_b, &r.eax_c, &r.eax_d, &r.eax_e, &r.eax_f])?;
    Ok(RobTarget {
        trans,
        rot,
        robconf,
        extax,
    })
}

fn external_axes(raw: [&String; 6]) -> Result<[f64; 6]> {
    const NAMES: [&str; 6] = ["eax_a", "eax_b", "eax_c", "eax_d", "eax_e", "eax_f"];
    let mut out = [0.0; 6];
    for (i, value) in raw.iter().enumerate() {
        out[i] = decimal(NAMES[i], value)?;
    }
    Ok(out)
}

// Event log

#[derive(Debug, Deserialize)]
struct ElogRecord {
    #[serde(rename = "_title")]
    title_path: String,
    msgtype: String,
    code: String,
    tstamp: String,
    argc: String,
    #[serde(default)]
    argv: Vec<ElogArg>,
    title: String,
    desc: String,
    conseqs: String,
    causes: String,
    actions: String,
}

#[derive(Debug, Deserialize)]
struct ElogArg {
    value: Value,
}

impl ElogRecord {
    fn into_entry(self) -> Result<EventLogEntry> {
        let seq = self.title_path.rsplit('/').next().unwrap_or_default();
        let seqnum = integer::<u64>("seqnum", seq)?;
        let argc = integer::<usize>("argc", &self.argc)?;
        if argc != self.argv.len() {
            return Err(RwsError::malformed(format!(
                "event {} declares {} arguments but carries {}",
                seqnum,
                argc,
                self.argv.len()
            )));
        }
        let tstamp = NaiveDateTime::parse_from_str(self.tstamp.trim(), ELOG_TIMESTAMP_FORMAT)
            .map_err(|e| RwsError::malformed(format!("event {} timestamp '{}': {}", seqnum, self.tstamp, e)))?;
        let args = self
            .argv
            .into_iter()
            .map(|a| match a.value {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        Ok(EventLogEntry {
            seqnum,
            msgtype: integer("msgtype", &self.msgtype)?,
            code: integer("code", &self.code)?,
            tstamp,
            argc,
            args,
            title: self.title,
            desc: self.desc,
            conseqs: self.conseqs,
            causes: self.causes,
            actions: self.actions,
        })
    }
}

/// Event log entries. Any malformed entry fails the whole read, since a
/// silently shortened log hides controller faults.
pub fn event_log(body: Option<Value>) -> Result<Vec<EventLogEntry>> {
    collection(body, "event log")?
        .into_iter()
        .map(|entry| {
            serde_json::from_value::<ElogRecord>(entry)
                .map_err(|e| RwsError::malformed(format!("event log entry: {}", e)))?
                .into_entry()
        })
        .collect()
}

// IPC

#[derive(Debug, Deserialize)]
struct IpcRecord {
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "dipc-data")]
    data: String,
    #[serde(rename = "dipc-userdef")]
    userdef: String,
    #[serde(rename = "dipc-msgtype")]
    msgtype: String,
    #[serde(rename = "dipc-cmd")]
    cmd: String,
    #[serde(rename = "queue-name")]
    queue_name: String,
}

pub fn ipc_messages(body: Option<Value>) -> Result<Vec<IpcMessage>> {
    collection(body, "ipc messages")?
        .into_iter()
        .map(|entry| {
            let record: IpcRecord =
                serde_json::from_value(entry).map_err(|e| RwsError::malformed(format!("ipc message: {}", e)))?;
            if record.kind != "dipc-read-li" {
                return Err(RwsError::malformed(format!("unexpected ipc entry type '{}'", record.kind)));
            }
            Ok(IpcMessage {
                data: record.data,
                userdef: record.userdef,
                msgtype: record.msgtype,
                cmd: record.cmd,
                queue_name: record.queue_name,
            })
        })
        .collect()
}

/// IPC queue state. The first collection or singleton record is used.
pub fn ipc_queue(body: Option<Value>, queue: &str) -> Result<IpcQueueInfo> {
    let body = require(body, "ipc queue")?;
    let singleton = body
        .get("state")
        .and_then(Value::as_array)
        .map(|state| state.first().cloned());
    let record = match singleton {
        Some(first) => first,
        None => collection(Some(body), "ipc queue")?.into_iter().next(),
    }
    .ok_or_else(|| RwsError::UnknownResource(format!("ipc queue {}", queue)))?;
    let Value::Object(fields) = record else {
        return Err(RwsError::malformed(format!("ipc queue {}: record is not an object", queue)));
    };
    let attributes = fields
        .into_iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            Value::Number(n) => Some((key, n.to_string())),
            Value::Bool(b) => Some((key, b.to_string())),
            _ => None,
        })
        .collect();
    Ok(IpcQueueInfo {
        name: queue.to_string(),
        attributes,
    })
}

// Remote mastering

#[derive(Debug, Deserialize)]
struct RmmpPollRecord {
    #[serde(rename = "_type")]
    kind: String,
    status: String,
}

pub fn rmmp_status(body: Option<Value>) -> Result<RmmpStatus> {
    let record: RmmpPollRecord = collection(body, "rmmp poll")?
        .into_iter()
        .next()
        .ok_or_else(|| RwsError::malformed("rmmp poll: no state"))
        .and_then(|entry| serde_json::from_value(entry).map_err(|e| RwsError::malformed(format!("rmmp poll: {}", e))))?;
    if record.kind != "user-rmmp-poll" {
        return Err(RwsError::malformed(format!("unexpected rmmp poll type '{}'", record.kind)));
    }
    Ok(match record.status.as_str() {
        "PENDING" => RmmpStatus::Pending,
        "GRANTED" => RmmpStatus::Granted,
        other => RmmpStatus::Other(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn elog_entry(seq: u64, argc: &str, argv: Value) -> Value {
        json!({
            "_type": "elog-message-li",
            "_title": format!("/rw/elog/0/{}", seq),
            "msgtype": "1",
            "code": "10011",
            "tstamp": "2024-03-01 T 14:22:05",
            "argc": argc,
            "argv": argv,
            "title": "Motors ON state",
            "desc": "The system is in the Motors ON state.",
            "conseqs": "",
            "causes": "",
            "actions": ""
        })
    }

    fn task(name: &str, active: &str, motiontask: &str) -> Value {
        json!({
            "_type": "rap-task-li",
            "name": name,
            "type": "normal",
            "taskstate": "linked",
            "excstate": "ready",
            "active": active,
            "motiontask": motiontask
        })
    }

    #[test]
    fn test_execution_state() {
        let body = json!({"state": [{"_type": "rap-execution", "ctrlexecstate": "stopped", "cycle": "forever"}]});
        let state = execution_state(Some(body)).unwrap();
        assert_eq!(state.ctrlexecstate, "stopped");
        assert_eq!(state.cycle, "forever");
    }

    #[test]
    fn test_singleton_rejects_empty_inputs() {
        assert!(matches!(controller_state(None), Err(RwsError::MalformedResponse(_))));
        assert!(matches!(
            controller_state(Some(json!({"state": []}))),
            Err(RwsError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_speed_ratio_checks_type() {
        let ok = json!({"state": [{"_type": "pnl-speedratio", "speedratio": "75"}]});
        assert_eq!(speed_ratio(Some(ok)).unwrap(), 75);
        let wrong = json!({"state": [{"_type": "pnl-opmode", "speedratio": "75"}]});
        assert!(speed_ratio(Some(wrong)).is_err());
    }

    #[test]
    fn test_tasks_skip_malformed_entries() {
        let broken = json!({"name": "T_BROKEN", "type": "normal", "active": "On"});
        let body = json!({"_embedded": {"resources": [task("T_ROB1", "On", "TRUE"), broken]}});
        let parsed = tasks(Some(body)).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "T_ROB1");
        assert!(parsed[0].active);
        assert!(parsed[0].motiontask);
    }

    #[test]
    fn test_tasks_ignore_non_task_resources_and_bad_flags() {
        let body = json!({"_embedded": {"resources": [
            {"_type": "rap-task-summary"},
            task("T_ROB1", "Off", "FALSE"),
            task("T_WEIRD", "Maybe", "TRUE")
        ]}});
        let parsed = tasks(Some(body)).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(!parsed[0].active);
        assert!(!parsed[0].motiontask);
    }

    #[test]
    fn test_tasks_empty_body() {
        assert!(tasks(None).unwrap().is_empty());
    }

    #[test]
    fn test_joint_target_in_degrees() {
        let body = json!({"state": [{
            "_type": "rap-jointtarget",
            "rax_1": "0", "rax_2": "-10.5", "rax_3": "20", "rax_4": "0", "rax_5": "90", "rax_6": "180",
            "eax_a": "9E+09", "eax_b": "9E+09", "eax_c": "9E+09", "eax_d": "9E+09", "eax_e": "9E+09", "eax_f": "9E+09"
        }]});
        let target = joint_target(Some(body)).unwrap();
        assert_eq!(target.robax, [0.0, -10.5, 20.0, 0.0, 90.0, 180.0]);
        assert_eq!(target.extax[5], 9e9);
    }

    fn robtarget_body(cf6: &str, q4: &str) -> Value {
        json!({"state": [{
            "_type": "ms-robtargets",
            "x": "364.35", "y": "0", "z": "594",
            "q1": "0.5", "q2": "0", "q3": "0.866025", "q4": q4,
            "cf1": "0", "cf4": "0", "cf6": cf6, "cfx": "0",
            "eax_a": "9E+09", "eax_b": "9E+09", "eax_c": "9E+09", "eax_d": "9E+09", "eax_e": "9E+09", "eax_f": "9E+09"
        }]})
    }

    #[test]
    fn test_rob_target_all_groups() {
        let target = rob_target(Some(robtarget_body("-1.0", "0"))).unwrap();
        assert_eq!(target.trans, [364.35, 0.0, 594.0]);
        assert_eq!(target.rot[2], 0.866025);
        assert_eq!(target.robconf, [0, 0, -1, 0]);
    }

    #[test]
    fn test_rob_target_fails_on_any_bad_group() {
        assert!(matches!(
            rob_target(Some(robtarget_body("0", "n/a"))),
            Err(RwsError::MalformedResponse(_))
        ));
        assert!(matches!(
            rob_target(Some(robtarget_body("0.5", "0"))),
            Err(RwsError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_event_log_entry() {
        let body = json!({"_embedded": {"resources": [
            elog_entry(42, "2", json!([{"type": "string", "value": "T_ROB1"}, {"type": "long", "value": "3"}]))
        ]}});
        let entries = event_log(Some(body)).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.seqnum, 42);
        assert_eq!(entry.code, 10011);
        assert_eq!(entry.args, vec!["T_ROB1".to_string(), "3".to_string()]);
        assert_eq!(entry.tstamp.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-01 14:22:05");
    }

    #[test]
    fn test_event_log_argument_count_mismatch() {
        let body = json!({"_embedded": {"resources": [
            elog_entry(7, "2", json!([{"type": "string", "value": "only one"}]))
        ]}});
        assert!(matches!(event_log(Some(body)), Err(RwsError::MalformedResponse(_))));
    }

    #[test]
    fn test_event_log_without_arguments() {
        let mut entry = elog_entry(8, "0", json!([]));
        entry.as_object_mut().unwrap().remove("argv");
        let entries = event_log(Some(json!({"_embedded": {"resources": [entry]}}))).unwrap();
        assert!(entries[0].args.is_empty());
    }

    #[test]
    fn test_event_log_bad_timestamp() {
        let mut entry = elog_entry(9, "0", json!([]));
        entry["tstamp"] = json!("03/01/2024 14:22");
        assert!(event_log(Some(json!({"_embedded": {"resources": [entry]}}))).is_err());
    }

    #[test]
    fn test_signal_value() {
        let body = json!({"_embedded": {"resources": [{"_type": "ios-signal-li", "name": "Auto", "lvalue": "1"}]}});
        let sig = signal(Some(body), &SignalAddress::qualified("IntBus", "IoPanel", "Auto")).unwrap();
        assert_eq!(sig.digital().unwrap(), 1);
        assert_eq!(sig.network.as_deref(), Some("IntBus"));
    }

    #[test]
    fn test_signal_missing_is_unknown_resource() {
        let body = json!({"_embedded": {"resources": []}});
        assert!(matches!(
            signal(Some(body), &SignalAddress::bare("nope")),
            Err(RwsError::UnknownResource(_))
        ));
    }

    #[test]
    fn test_ipc_messages() {
        let body = json!({"_embedded": {"_state": [{
            "_type": "dipc-read-li",
            "dipc-data": "\"hello\"",
            "dipc-userdef": "1",
            "dipc-msgtype": "1",
            "dipc-cmd": "111",
            "queue-name": "MY_QUEUE"
        }]}});
        let messages = ipc_messages(Some(body)).unwrap();
        assert_eq!(messages[0].queue_name, "MY_QUEUE");
        assert_eq!(messages[0].data, "\"hello\"");

        let wrong = json!({"_embedded": {"_state": [{
            "_type": "dipc-queue-li",
            "dipc-data": "", "dipc-userdef": "", "dipc-msgtype": "", "dipc-cmd": "", "queue-name": "Q"
        }]}});
        assert!(ipc_messages(Some(wrong)).is_err());
    }

    #[test]
    fn test_symbol_search_results() {
        let body = json!({"_embedded": {"_state": [
            {"_type": "rap-symproppers", "name": "test_num", "symburl": "RAPID/T_ROB1/user/test_num", "symtyp": "per", "dattyp": "num"},
            {"_type": "rap-symproppers", "name": "joints", "symburl": "RAPID/T_ROB1/user/joints", "dattyp": "jointtarget"},
            {"_type": "rap-sympropsearch-sum"}
        ]}});
        let symbols = rapid_symbols(Some(body)).unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].dattyp.as_deref(), Some("num"));
        assert_eq!(symbols[1].symtyp, None);
        assert!(rapid_symbols(None).unwrap().is_empty());
    }

    #[test]
    fn test_directory_listing() {
        let body = json!({"_embedded": {"resources": [
            {"_type": "fs-file", "_title": "motion_program_exec.mod"},
            {"_type": "fs-dir", "_title": "logs"}
        ]}});
        assert_eq!(file_names(Some(body)).unwrap(), vec!["motion_program_exec.mod", "logs"]);

        let broken = json!({"_embedded": {"resources": [{"_type": "fs-file"}]}});
        assert!(matches!(file_names(Some(broken)), Err(RwsError::MalformedResponse(_))));
    }

    #[test]
    fn test_ipc_queue_attributes() {
        let body = json!({"state": [{"_type": "dipc-queue", "_title": "PC_QUEUE", "dipc-queue-id": "65536", "dipc-queue-size": 4440}]});
        let info = ipc_queue(Some(body), "PC_QUEUE").unwrap();
        assert_eq!(info.name, "PC_QUEUE");
        assert_eq!(info.attributes.get("dipc-queue-id").map(String::as_str), Some("65536"));
        assert_eq!(info.attributes.get("dipc-queue-size").map(String::as_str), Some("4440"));
        assert!(!info.attributes.contains_key("_type"));
    }

    #[test]
    fn test_rmmp_poll_states() {
        let poll = |status: &str| json!({"_embedded": {"_state": [{"_type": "user-rmmp-poll", "status": status}]}});
        assert_eq!(rmmp_status(Some(poll("PENDING"))).unwrap(), RmmpStatus::Pending);
        assert_eq!(rmmp_status(Some(poll("GRANTED"))).unwrap(), RmmpStatus::Granted);
        assert_eq!(rmmp_status(Some(poll("DENIED"))).unwrap(), RmmpStatus::Other("DENIED".into()));

        let wrong = json!({"_embedded": {"_state": [{"_type": "user-rmmp", "status": "GRANTED"}]}});
        assert!(rmmp_status(Some(wrong)).is_err());
    }
}
