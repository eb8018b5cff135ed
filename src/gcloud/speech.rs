//! Speech-to-Text transcription.
//!
//! Audio already sitting in Cloud Storage goes through the asynchronous
//! `speech:longrunningrecognize` API and is polled to completion; inline
//! Base64 audio goes through the synchronous `speech:recognize` API. Either
//! way the results are flattened into a single transcript, which can be
//! written back to a bucket instead of being returned.

use std::str::FromStr;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::auth::LENIENT_BASE64;
use super::lro::{OperationPoller, PollPolicy, PollProgress};
use super::storage::{GcsUri, StorageClient, GCS_SCHEME};
use super::{json_response, Credential, GoogleCloudClient};
use crate::error::{GcpError, Result};

/// Returned when recognition produced no results.
pub const NO_SPEECH_DETECTED: &str = "(No speech detected)";

pub const RAW_AUDIO_SOURCE_NAME: &str = "raw_audio";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    GcsUri,
    RawBytesBase64,
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace([' ', '_'], "-").as_str() {
            "gcs" | "gcs-uri" | "uri" => Ok(Self::GcsUri),
            "raw" | "base64" | "raw-bytes" | "raw-audio" => Ok(Self::RawBytesBase64),
            other => Err(format!(
                "unknown input mode '{other}' (expected gcs-uri or base64)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRequest {
    mode: InputMode,
    payload: String,
    language_code: String,
    model: String,
}

impl TranscriptRequest {
    pub fn new(
        mode: InputMode,
        payload: impl Into<String>,
        language_code: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            payload: payload.into(),
            language_code: language_code.into(),
            model: model.into(),
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn config(&self) -> RecognitionConfig {
        RecognitionConfig {
            language_code: self.language_code.clone(),
            model: self.model.clone(),
            enable_automatic_punctuation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub bucket: String,
}

impl OutputTarget {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    language_code: String,
    model: String,
    enable_automatic_punctuation: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
enum RecognitionAudio {
    Uri(String),
    Content(String),
}

#[derive(Debug, Clone, Serialize)]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub results: Vec<SpeechRecognitionResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechRecognitionResult {
    #[serde(default)]
    pub alternatives: Vec<SpeechRecognitionAlternative>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechRecognitionAlternative {
    #[serde(default)]
    pub transcript: String,
}

#[derive(Debug, Deserialize)]
struct SubmittedOperation {
    #[serde(default)]
    name: Option<String>,
}

/// Flattens recognition results into one line of text: the top alternative
/// of every result, empty ones dropped, joined by single spaces.
pub fn extract_transcript(response: &RecognizeResponse) -> String {
    if response.results.is_empty() {
        return NO_SPEECH_DETECTED.to_string();
    }

    response
        .results
        .iter()
        .filter_map(|result| result.alternatives.first())
        .map(|alternative| alternative.transcript.as_str())
        .filter(|transcript| !transcript.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn output_object_path(source_name: &str) -> String {
    format!("output/audio/{source_name}/speech-to-text/text.txt")
}

#[derive(Debug, Clone)]
pub struct SpeechClient {
    client: GoogleCloudClient,
    storage: StorageClient,
    poller: OperationPoller,
}

impl SpeechClient {
    pub fn new(client: GoogleCloudClient) -> Self {
        Self {
            storage: StorageClient::new(client.clone()),
            poller: OperationPoller::new(client.clone()),
            client,
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poller = self.poller.with_policy(policy);
        self
    }

    pub fn with_progress(mut self, progress: UnboundedSender<PollProgress>) -> Self {
        self.poller = self.poller.with_progress(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.poller = self.poller.with_cancellation(cancel);
        self
    }

    /// Transcribes `request` and returns the transcript, or the `gs://` URI
    /// it was written to when `output` is given.
    pub async fn transcribe(
        &self,
        request: &TranscriptRequest,
        credential: &Credential,
        output: Option<&OutputTarget>,
    ) -> Result<String> {
        let payload = request.payload().trim();
        if payload.is_empty() {
            return Err(GcpError::validation(
                "Please provide a GCS URI or Base64 audio input.",
            ));
        }
        credential.validate()?;
        if output.is_some_and(|target| target.bucket.trim().is_empty()) {
            return Err(GcpError::validation("Please provide an output bucket name."));
        }

        let (transcript, source_name) = match request.mode() {
            InputMode::GcsUri => {
                if !payload.starts_with(GCS_SCHEME) {
                    return Err(GcpError::validation(
                        "Input Mode is set to GCS URI but input does not start with gs://",
                    ));
                }
                let uri = GcsUri::parse(payload)?;
                if uri.file_name().is_empty() {
                    return Err(GcpError::validation(format!(
                        "{uri} is a folder, not an audio object"
                    )));
                }
                let transcript = self.recognize_long_running(&uri, request, credential).await?;
                (transcript, uri.file_name().to_string())
            }
            InputMode::RawBytesBase64 => {
                let audio: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
                if LENIENT_BASE64.decode(&audio).is_err() {
                    return Err(GcpError::validation(
                        "Input Mode is set to raw audio but input is not valid Base64",
                    ));
                }
                let transcript = self.recognize_inline(audio, request, credential).await?;
                (transcript, RAW_AUDIO_SOURCE_NAME.to_string())
            }
        };

        match output {
            Some(target) => {
                let object_path = output_object_path(&source_name);
                self.storage
                    .write(&target.bucket, &object_path, &transcript, credential)
                    .await
            }
            None => Ok(transcript),
        }
    }

    async fn recognize_long_running(
        &self,
        uri: &GcsUri,
        request: &TranscriptRequest,
        credential: &Credential,
    ) -> Result<String> {
        let body = RecognizeRequest {
            config: request.config(),
            audio: RecognitionAudio::Uri(uri.to_string()),
        };
        let url = format!("{}/speech:longrunningrecognize", self.speech_root());
        let submitted: SubmittedOperation = self.post_json(&url, &body, credential).await?;

        let operation_id = submitted
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| GcpError::protocol("No operation name returned from API."))?;
        info!(%uri, operation_id = %operation_id, "Submitted long-running recognition");

        let operations_url = self.client.endpoints().operations_url();
        let operation = self
            .poller
            .poll(&operation_id, &operations_url, credential)
            .await?;

        if let Some((_, message)) = operation.error() {
            return Err(GcpError::RemoteApi {
                status: None,
                message: format!("Recognition failed: {message}"),
            });
        }

        let response = match operation.response() {
            Some(value) => RecognizeResponse::deserialize(value).map_err(|e| {
                GcpError::protocol(format!("Failed to parse recognition result: {e}"))
            })?,
            None => RecognizeResponse::default(),
        };

        Ok(extract_transcript(&response))
    }

    async fn recognize_inline(
        &self,
        audio: String,
        request: &TranscriptRequest,
        credential: &Credential,
    ) -> Result<String> {
        let body = RecognizeRequest {
            config: request.config(),
            audio: RecognitionAudio::Content(audio),
        };
        let url = format!("{}/speech:recognize", self.speech_root());
        let response: RecognizeResponse = self.post_json(&url, &body, credential).await?;

        Ok(extract_transcript(&response))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &RecognizeRequest,
        credential: &Credential,
    ) -> Result<T> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        let target = credential.apply(url, headers)?;
        let body = serde_json::to_vec(body)?;
        debug!(url, bytes = body.len(), "Sending recognition request");

        let response = self
            .client
            .http()
            .post(&target.url)
            .headers(target.headers)
            .body(body)
            .send()
            .await?;

        json_response(response, "Speech-to-Text").await
    }

    fn speech_root(&self) -> &str {
        self.client.endpoints().speech_root.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcloud::Endpoints;
    use serde_json::json;

    fn response(value: serde_json::Value) -> RecognizeResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_extract_empty_results() {
        assert_eq!(extract_transcript(&response(json!({"results": []}))), NO_SPEECH_DETECTED);
        assert_eq!(extract_transcript(&response(json!({}))), NO_SPEECH_DETECTED);
    }

    #[test]
    fn test_extract_joins_and_drops_empty() {
        let value = json!({"results": [
            {"alternatives": [{"transcript": "a"}]},
            {"alternatives": [{"transcript": ""}]},
            {"alternatives": [{"transcript": "b"}]}
        ]});
        assert_eq!(extract_transcript(&response(value)), "a b");
    }

    #[test]
    fn test_extract_uses_first_alternative_only() {
        let value = json!({"results": [
            {"alternatives": [{"transcript": "hello", "confidence": 0.9}, {"transcript": "yellow"}]},
            {"alternatives": []},
            {"alternatives": [{"transcript": " world "}]}
        ]});
        assert_eq!(extract_transcript(&response(value)), "hello  world");
    }

    #[test]
    fn test_output_object_path() {
        assert_eq!(
            output_object_path("clip.mp3"),
            "output/audio/clip.mp3/speech-to-text/text.txt"
        );
        assert_eq!(
            output_object_path(RAW_AUDIO_SOURCE_NAME),
            "output/audio/raw_audio/speech-to-text/text.txt"
        );
    }

    #[test]
    fn test_request_body_shapes() {
        let request = TranscriptRequest::new(InputMode::GcsUri, "gs://b/a.mp3", "en-US", "latest_long");
        let body = RecognizeRequest {
            config: request.config(),
            audio: RecognitionAudio::Uri("gs://b/a.mp3".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "config": {"languageCode": "en-US", "model": "latest_long", "enableAutomaticPunctuation": true},
                "audio": {"uri": "gs://b/a.mp3"}
            })
        );

        let body = RecognizeRequest {
            config: request.config(),
            audio: RecognitionAudio::Content("AAAA".to_string()),
        };
        assert_eq!(serde_json::to_value(&body).unwrap()["audio"], json!({"content": "AAAA"}));
    }

    #[test]
    fn test_parse_input_mode() {
        assert_eq!("gcs-uri".parse::<InputMode>().unwrap(), InputMode::GcsUri);
        assert_eq!("Raw Audio".parse::<InputMode>().unwrap(), InputMode::RawBytesBase64);
        assert!("mp3".parse::<InputMode>().is_err());
    }

    #[tokio::test]
    async fn test_validation_before_network() {
        let client = SpeechClient::new(GoogleCloudClient::new(Endpoints::with_base("http://127.0.0.1:1")));
        let key = Credential::api_key("k");

        let empty = TranscriptRequest::new(InputMode::GcsUri, "   ", "en-US", "default");
        assert!(matches!(
            client.transcribe(&empty, &key, None).await,
            Err(GcpError::Validation(_))
        ));

        let wrong_mode = TranscriptRequest::new(InputMode::GcsUri, "AAAA", "en-US", "default");
        assert!(matches!(
            client.transcribe(&wrong_mode, &key, None).await,
            Err(GcpError::Validation(_))
        ));

        let not_base64 = TranscriptRequest::new(InputMode::RawBytesBase64, "gs://b/a.mp3", "en-US", "default");
        assert!(matches!(
            client.transcribe(&not_base64, &key, None).await,
            Err(GcpError::Validation(_))
        ));

        let folder = TranscriptRequest::new(InputMode::GcsUri, "gs://b/audio/", "en-US", "default");
        assert!(matches!(
            client.transcribe(&folder, &key, None).await,
            Err(GcpError::Validation(_))
        ));

        let ok = TranscriptRequest::new(InputMode::GcsUri, "gs://b/a.mp3", "en-US", "default");
        assert!(matches!(
            client.transcribe(&ok, &Credential::api_key(""), None).await,
            Err(GcpError::Validation(_))
        ));
    }
}
