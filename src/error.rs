//! Error types shared by every Google Cloud component.

/// Errors surfaced by the storage, polling and speech components.
///
/// No component retries on any of these; retry policy belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum GcpError {
    /// Bad or missing input (empty credential, malformed URI, wrong input mode)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-success HTTP response, or a transport failure when `status` is `None`
    #[error("{}", remote_api_message(.status, .message))]
    RemoteApi {
        status: Option<u16>,
        message: String,
    },

    /// Response body could not be parsed, or a required field was missing
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Long-running operation did not finish before the deadline
    #[error("Operation {operation_id} timed out after {elapsed_minutes:.1} minutes")]
    Timeout {
        operation_id: String,
        elapsed_minutes: f64,
    },

    /// Polling was abandoned through a cancellation token
    #[error("Operation {operation_id} was cancelled")]
    Cancelled { operation_id: String },
}

fn remote_api_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("API error ({code}): {message}"),
        None => format!("API error: {message}"),
    }
}

impl GcpError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// HTTP status carried by a `RemoteApi` error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GcpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Protocol(err.to_string());
        }
        Self::RemoteApi {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GcpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GcpError>;
