use async_trait::async_trait;

use super::{AuthArgs, CloudOperation};
use crate::error::{GcpError, Result};
use crate::gcloud::{GoogleCloudClient, StorageClient, GCS_SCHEME};

/// Downloads a `gs://` object and returns its bytes.
pub struct ReadFile {
    storage: StorageClient,
}

impl ReadFile {
    pub fn new(client: GoogleCloudClient) -> Self {
        Self {
            storage: StorageClient::new(client),
        }
    }
}

#[async_trait]
impl CloudOperation for ReadFile {
    type Args = AuthArgs;
    type Output = Vec<u8>;

    fn name(&self) -> &str {
        "GCloud Read File"
    }

    async fn run(&self, input: &str, auth: &AuthArgs) -> Result<Vec<u8>> {
        let uri = input.trim();
        if !uri.starts_with(GCS_SCHEME) {
            return Err(GcpError::validation(
                "Input must be a GCS URI starting with gs://",
            ));
        }
        let credential = auth.credential()?;
        self.storage.read(uri, &credential).await
    }
}
