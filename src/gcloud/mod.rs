//! Google Cloud REST plumbing.
//!
//! - **auth**: credential decoding and application
//! - **storage**: Cloud Storage list/read/write
//! - **lro**: long-running operation polling
//! - **speech**: Speech-to-Text recognition and transcript extraction
//!
//! All components share one [`GoogleCloudClient`], a cheap-to-clone handle
//! around a `reqwest::Client` and the set of [`Endpoints`] to talk to.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{GcpError, Result};

pub mod auth;
pub mod lro;
pub mod speech;
pub mod storage;

pub use auth::{AuthKind, AuthString, AuthorizedTarget, Credential, SecretEncoding};
pub use lro::{OperationPoller, PollPolicy, PollProgress, PollableOperation};
pub use speech::{InputMode, OutputTarget, SpeechClient, TranscriptRequest, NO_SPEECH_DETECTED};
pub use storage::{GcsUri, ObjectDescriptor, StorageClient, GCS_SCHEME};

pub const STORAGE_ROOT: &str = "https://storage.googleapis.com/storage/v1";

pub const STORAGE_UPLOAD_ROOT: &str = "https://storage.googleapis.com/upload/storage/v1";

pub const SPEECH_ROOT: &str = "https://speech.googleapis.com/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub storage_root: String,
    pub storage_upload_root: String,
    pub speech_root: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            storage_root: STORAGE_ROOT.to_string(),
            storage_upload_root: STORAGE_UPLOAD_ROOT.to_string(),
            speech_root: SPEECH_ROOT.to_string(),
        }
    }
}

impl Endpoints {
    /// Points every surface at one base URL (emulator or mock server).
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            storage_root: format!("{base}/storage/v1"),
            storage_upload_root: format!("{base}/upload/storage/v1"),
            speech_root: format!("{base}/v1"),
        }
    }

    pub fn operations_url(&self) -> String {
        format!("{}/operations/", self.speech_root.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GoogleCloudClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl GoogleCloudClient {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
        }
    }

    pub fn with_http_client(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

pub(crate) fn error_message_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

// Unreadable or non-JSON bodies fall back to the status text.
pub(crate) async fn remote_error(response: Response) -> GcpError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message_from_body(&body).unwrap_or_else(|| status_text(status));

    tracing::warn!(status = status.as_u16(), %message, "Google Cloud API returned an error");

    GcpError::RemoteApi {
        status: Some(status.as_u16()),
        message,
    }
}

pub(crate) async fn json_response<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    if !response.status().is_success() {
        return Err(remote_error(response).await);
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| GcpError::protocol(format!("Failed to parse {what} response: {e}")))
}

pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(remote_error(response).await)
    }
}
