//! Long-running operation polling.
//!
//! Google APIs hand back an operation name for work that takes longer than a
//! single request. [`OperationPoller`] fetches the operation status on a fixed
//! interval until it reports `done`, the deadline passes, or the caller's
//! cancellation token fires.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{json_response, Credential, GoogleCloudClient};
use crate::error::{GcpError, Result};

pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Deadline and spacing for status checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_wait: Duration,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollPolicy {
    pub fn new(max_wait: Duration, interval: Duration) -> Self {
        Self { max_wait, interval }
    }

    /// Deadline in fractional minutes; non-positive or NaN means no waiting,
    /// anything beyond `Duration::MAX` saturates.
    pub fn from_minutes(max_minutes: f64) -> Self {
        let max_wait = if max_minutes > 0.0 {
            Duration::try_from_secs_f64(max_minutes * 60.0).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self {
            max_wait,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollableOperation {
    pub id: String,
    pub done: bool,
    pub payload: Value,
}

impl PollableOperation {
    fn from_payload(id: &str, payload: Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(GcpError::protocol(format!(
                "Operation {id} status is not a JSON object"
            )));
        }
        let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            id: id.to_string(),
            done,
            payload,
        })
    }

    pub fn response(&self) -> Option<&Value> {
        self.payload.get("response")
    }

    /// `(code, message)` of a server-side failure.
    pub fn error(&self) -> Option<(Option<i64>, String)> {
        let error = self.payload.get("error")?;
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Operation failed")
            .to_string();
        Some((error.get("code").and_then(Value::as_i64), message))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollProgress {
    pub operation_id: String,
    pub elapsed: Duration,
}

impl PollProgress {
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.as_secs()
    }
}

#[derive(Debug, Clone)]
pub struct OperationPoller {
    client: GoogleCloudClient,
    policy: PollPolicy,
    progress: Option<UnboundedSender<PollProgress>>,
    cancel: Option<CancellationToken>,
}

impl OperationPoller {
    pub fn new(client: GoogleCloudClient) -> Self {
        Self {
            client,
            policy: PollPolicy::default(),
            progress: None,
            cancel: None,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Progress events are sent without waiting; a dropped receiver is ignored.
    pub fn with_progress(mut self, progress: UnboundedSender<PollProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// The deadline is checked before every status request.
    pub async fn poll(
        &self,
        operation_id: &str,
        base_url: &str,
        credential: &Credential,
    ) -> Result<PollableOperation> {
        credential.validate()?;

        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= self.policy.max_wait {
                return Err(GcpError::Timeout {
                    operation_id: operation_id.to_string(),
                    elapsed_minutes: elapsed.as_secs_f64() / 60.0,
                });
            }
            if self.is_cancelled() {
                return Err(self.cancelled(operation_id));
            }

            let operation = self.fetch_status(operation_id, base_url, credential).await?;
            if operation.done {
                info!(operation_id, elapsed_secs = start.elapsed().as_secs(), "Operation finished");
                return Ok(operation);
            }

            let elapsed = start.elapsed();
            debug!(operation_id, elapsed_secs = elapsed.as_secs(), "Operation still running");
            if let Some(progress) = &self.progress {
                let _ = progress.send(PollProgress {
                    operation_id: operation_id.to_string(),
                    elapsed,
                });
            }

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(self.cancelled(operation_id)),
                        _ = tokio::time::sleep(self.policy.interval) => {}
                    }
                }
                None => tokio::time::sleep(self.policy.interval).await,
            }
        }
    }

    async fn fetch_status(
        &self,
        operation_id: &str,
        base_url: &str,
        credential: &Credential,
    ) -> Result<PollableOperation> {
        let url = format!("{base_url}{operation_id}");
        let target = credential.apply(&url, HeaderMap::new())?;

        let response = self
            .client
            .http()
            .get(&target.url)
            .headers(target.headers)
            .send()
            .await?;

        let payload: Value = json_response(response, "operation status").await?;
        PollableOperation::from_payload(operation_id, payload)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn cancelled(&self, operation_id: &str) -> GcpError {
        info!(operation_id, "Operation polling cancelled");
        GcpError::Cancelled {
            operation_id: operation_id.to_string(),
        }
    }
}
