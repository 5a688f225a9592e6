//! Error types for Robot Web Services operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RwsError>;

/// Controller error code for "IPC queue already exists".
pub const DIPC_QUEUE_EXISTS: i64 = -1073445879;

#[derive(Error, Debug)]
pub enum RwsError {
    #[error("Connection failed: {0}")]
    Connectivity(String),

    #[error("HTTP {status} from controller: {body}")]
    Transport { status: u16, body: String },

    #[error("Mastership required for {path}")]
    MastershipRequired { path: String },

    #[error("Mastership denied: {0}")]
    MastershipDenied(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Invalid subscription request: {0}")]
    InvalidSubscription(String),

    /// Refused locally; no request reached the controller.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{operation}; releasing mastership afterwards also failed: {release}")]
    MastershipReleaseFailed {
        operation: Box<RwsError>,
        release: Box<RwsError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RwsError {
    pub(crate) fn malformed(what: impl std::fmt::Display) -> Self {
        RwsError::MalformedResponse(what.to_string())
    }

    /// Controller error code carried in a transport error body, if any.
    ///
    /// RWS reports failures as `{"status": {"code": ..., "msg": ...}}`, sometimes
    /// nested under `_embedded`. Codes arrive either as numbers or strings.
    pub fn controller_code(&self) -> Option<i64> {
        let RwsError::Transport { body, .. } = self else {
            return None;
        };
        let json: serde_json::Value = serde_json::from_str(body).ok()?;
        let status = json
            .get("status")
            .or_else(|| json.get("_embedded").and_then(|e| e.get("status")))?;
        match status.get("code")? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// True for errors a caller may resolve by waiting and retrying.
    pub fn is_mastership_denial(&self) -> bool {
        matches!(self, RwsError::MastershipDenied(_))
    }
}

impl From<reqwest::Error> for RwsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            RwsError::Connectivity(e.to_string())
        } else if e.is_decode() {
            RwsError::MalformedResponse(e.to_string())
        } else {
            match e.status() {
                Some(status) => RwsError::Transport {
                    status: status.as_u16(),
                    body: e.to_string(),
                },
                None => RwsError::Connectivity(e.to_string()),
            }
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RwsError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RwsError::WebSocket(e.to_string())
    }
}
