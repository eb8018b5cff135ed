use async_trait::async_trait;

use crate::error::Result;
use crate::gcloud::{AuthKind, AuthString, Credential};

/// A user-facing cloud operation: takes the raw text input plus typed
/// arguments and produces its output.
#[async_trait]
pub trait CloudOperation: Send + Sync {
    type Args: Send + Sync;
    type Output: Send;

    fn name(&self) -> &str;
    async fn run(&self, input: &str, args: &Self::Args) -> Result<Self::Output>;
}

/// Auth arguments shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthArgs {
    pub kind: AuthKind,
    pub auth_string: AuthString,
    /// Billing project for OAuth tokens from Application Default Credentials.
    pub quota_project: String,
}

impl AuthArgs {
    pub fn new(kind: AuthKind, auth_string: AuthString) -> Self {
        Self {
            kind,
            auth_string,
            quota_project: String::new(),
        }
    }

    pub fn with_quota_project(mut self, project: impl Into<String>) -> Self {
        self.quota_project = project.into();
        self
    }

    /// Decodes the auth string and builds the per-call credential.
    pub fn credential(&self) -> Result<Credential> {
        let secret = self.auth_string.decode()?;
        let credential = Credential {
            kind: self.kind,
            secret,
            quota_project: None,
        }
        .with_quota_project(self.quota_project.as_str());
        credential.validate()?;
        Ok(credential)
    }
}

pub mod list_bucket;
pub mod read_file;
pub mod speech_to_text;

pub use list_bucket::{ListBucket, ListBucketArgs, ListFormat};
pub use read_file::ReadFile;
pub use speech_to_text::{Destination, SpeechToText, SpeechToTextArgs, DEFAULT_OUTPUT_BUCKET};
