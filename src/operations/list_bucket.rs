use std::str::FromStr;

use async_trait::async_trait;

use super::{AuthArgs, CloudOperation};
use crate::error::{GcpError, Result};
use crate::gcloud::{GoogleCloudClient, ObjectDescriptor, StorageClient, GCS_SCHEME};

pub const DEFAULT_PREFIX: &str = "audio/";

/// How listed objects are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFormat {
    /// One `gs://` URI per line, ready to feed into other operations
    #[default]
    Uris,
    /// Last path segment of each object, one per line
    Filenames,
    /// Pretty-printed JSON array of object descriptors
    Json,
}

impl FromStr for ListFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uris" | "uri" | "gcs-uris" => Ok(Self::Uris),
            "filenames" | "names" => Ok(Self::Filenames),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown list format '{other}' (expected uris, filenames or json)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBucketArgs {
    pub prefix: String,
    pub format: ListFormat,
    pub auth: AuthArgs,
}

impl ListBucketArgs {
    pub fn new(auth: AuthArgs) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            format: ListFormat::default(),
            auth,
        }
    }
}

/// Lists a bucket's objects as text.
pub struct ListBucket {
    storage: StorageClient,
}

impl ListBucket {
    pub fn new(client: GoogleCloudClient) -> Self {
        Self {
            storage: StorageClient::new(client),
        }
    }
}

/// Accepts `bucket`, `bucket/…` or `gs://bucket/…` and returns the bucket.
pub fn normalize_bucket(input: &str) -> &str {
    let trimmed = input.trim();
    let without_scheme = trimmed.strip_prefix(GCS_SCHEME).unwrap_or(trimmed);
    without_scheme.split('/').next().unwrap_or_default()
}

pub fn format_listing(items: &[ObjectDescriptor], format: ListFormat) -> Result<String> {
    let rendered = match format {
        ListFormat::Uris => items
            .iter()
            .map(|item| item.uri.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        ListFormat::Filenames => items
            .iter()
            .map(|item| item.name.rsplit('/').next().unwrap_or(&item.name))
            .collect::<Vec<_>>()
            .join("\n"),
        ListFormat::Json => serde_json::to_string_pretty(items)?,
    };
    Ok(rendered)
}

#[async_trait]
impl CloudOperation for ListBucket {
    type Args = ListBucketArgs;
    type Output = String;

    fn name(&self) -> &str {
        "GCloud List Bucket"
    }

    async fn run(&self, input: &str, args: &ListBucketArgs) -> Result<String> {
        let bucket = normalize_bucket(input);
        if bucket.is_empty() {
            return Err(GcpError::validation("Please provide a GCS bucket name."));
        }
        let credential = args.auth.credential()?;

        let items = self.storage.list(bucket, &args.prefix, &credential).await?;
        if items.is_empty() {
            return Ok(format!("No objects found in {GCS_SCHEME}{bucket}/{}", args.prefix));
        }

        format_listing(&items, args.format)
    }
}
