//! Cloud Storage client: list, read and write objects through the JSON API.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use super::{ensure_success, json_response, Credential, GoogleCloudClient};
use crate::error::{GcpError, Result};

pub const GCS_SCHEME: &str = "gs://";

const LIST_FIELDS: &str = "items(name,size,contentType)";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// A `gs://bucket/object-path` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GcsUri {
    pub bucket: String,
    pub object: String,
}

impl GcsUri {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || {
            GcpError::validation(format!(
                "Invalid GCS URI '{uri}': expected gs://bucket/path/to/object"
            ))
        };

        let rest = uri.strip_prefix(GCS_SCHEME).ok_or_else(invalid)?;
        let (bucket, object) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || object.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(bucket, object))
    }

    pub fn file_name(&self) -> &str {
        self.object.rsplit('/').next().unwrap_or(&self.object)
    }
}

impl fmt::Display for GcsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{GCS_SCHEME}{}/{}", self.bucket, self.object)
    }
}

impl FromStr for GcsUri {
    type Err = GcpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// `/` stays literal
pub(crate) fn encode_object_path(path: &str) -> String {
    urlencoding::encode(path).replace("%2F", "/")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDescriptor {
    pub name: String,
    #[serde(rename = "gs_uri")]
    pub uri: String,
    pub size: Option<u64>,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedObject {
    name: String,
    #[serde(default, deserialize_with = "size_from_string_or_number")]
    size: Option<u64>,
    #[serde(default)]
    content_type: Option<String>,
}

/// GCS reports `size` as a decimal string; accept plain numbers too.
fn size_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    match Option::<Size>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Size::Number(n)) => Ok(Some(n)),
        Some(Size::Text(text)) => text.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone)]
pub struct StorageClient {
    client: GoogleCloudClient,
}

impl StorageClient {
    pub fn new(client: GoogleCloudClient) -> Self {
        Self { client }
    }

    /// Folder placeholders (names ending in `/`) are dropped; backend order is kept.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        credential: &Credential,
    ) -> Result<Vec<ObjectDescriptor>> {
        if bucket.is_empty() {
            return Err(GcpError::validation("Please provide a GCS bucket name."));
        }

        let mut url = format!(
            "{}/b/{}/o?fields={}",
            self.client.endpoints().storage_root,
            urlencoding::encode(bucket),
            urlencoding::encode(LIST_FIELDS),
        );
        if !prefix.is_empty() {
            url.push_str("&prefix=");
            url.push_str(&urlencoding::encode(prefix));
        }

        let target = credential.apply(&url, HeaderMap::new())?;
        debug!(bucket, prefix, "Listing GCS objects");

        let response = self
            .client
            .http()
            .get(&target.url)
            .headers(target.headers)
            .send()
            .await?;

        let listing: ObjectList = json_response(response, "GCS list").await?;

        Ok(listing
            .items
            .into_iter()
            .filter(|item| !item.name.ends_with('/'))
            .map(|item| ObjectDescriptor {
                uri: GcsUri::new(bucket, item.name.as_str()).to_string(),
                name: item.name,
                size: item.size,
                content_type: item.content_type,
            })
            .collect())
    }

    pub async fn read(&self, uri: &str, credential: &Credential) -> Result<Vec<u8>> {
        let location = GcsUri::parse(uri)?;

        let url = format!(
            "{}/b/{}/o/{}?alt=media",
            self.client.endpoints().storage_root,
            urlencoding::encode(&location.bucket),
            encode_object_path(&location.object),
        );
        let target = credential.apply(&url, HeaderMap::new())?;
        debug!(%location, "Reading GCS object");

        let response = self
            .client
            .http()
            .get(&target.url)
            .headers(target.headers)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Uploads `content` as UTF-8 text to `bucket/object_path` and returns
    /// its `gs://` URI.
    pub async fn write(
        &self,
        bucket: &str,
        object_path: &str,
        content: &str,
        credential: &Credential,
    ) -> Result<String> {
        if bucket.is_empty() || object_path.is_empty() {
            return Err(GcpError::validation(
                "Writing to GCS requires both a bucket and an object path.",
            ));
        }

        let url = format!(
            "{}/b/{}/o?uploadType=media&name={}",
            self.client.endpoints().storage_upload_root,
            urlencoding::encode(bucket),
            encode_object_path(object_path),
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));
        let target = credential.apply(&url, headers)?;

        let response = self
            .client
            .http()
            .post(&target.url)
            .headers(target.headers)
            .body(content.to_string())
            .send()
            .await?;
        ensure_success(response).await?;

        let uri = GcsUri::new(bucket, object_path).to_string();
        info!(%uri, bytes = content.len(), "Wrote GCS object");
        Ok(uri)
    }
}
