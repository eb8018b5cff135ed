use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::{AuthArgs, CloudOperation};
use crate::error::Result;
use crate::gcloud::{
    GoogleCloudClient, InputMode, OutputTarget, PollPolicy, PollProgress, SpeechClient,
    TranscriptRequest,
};

pub const DEFAULT_LANGUAGE_CODE: &str = "en-US";
pub const DEFAULT_MODEL: &str = "latest_long";
pub const DEFAULT_OUTPUT_BUCKET: &str = "cyber-chef-cloud-examples";
pub const DEFAULT_MAX_POLL_MINUTES: f64 = 30.0;

/// Where the transcript ends up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    /// Return the transcript text itself
    #[default]
    Return,
    /// Write it to the bucket and return the object's `gs://` URI
    WriteToGcs { bucket: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechToTextArgs {
    pub mode: InputMode,
    pub language_code: String,
    pub model: String,
    pub destination: Destination,
    pub max_poll_minutes: f64,
    pub auth: AuthArgs,
}

impl SpeechToTextArgs {
    pub fn new(auth: AuthArgs) -> Self {
        Self {
            mode: InputMode::default(),
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            destination: Destination::default(),
            max_poll_minutes: DEFAULT_MAX_POLL_MINUTES,
            auth,
        }
    }
}

/// Transcribes a `gs://` URI or inline Base64 audio.
pub struct SpeechToText {
    client: GoogleCloudClient,
    progress: Option<UnboundedSender<PollProgress>>,
    cancel: Option<CancellationToken>,
}

impl SpeechToText {
    pub fn new(client: GoogleCloudClient) -> Self {
        Self {
            client,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_progress(mut self, progress: UnboundedSender<PollProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn speech_client(&self, args: &SpeechToTextArgs) -> SpeechClient {
        let mut speech = SpeechClient::new(self.client.clone())
            .with_poll_policy(PollPolicy::from_minutes(args.max_poll_minutes));
        if let Some(progress) = &self.progress {
            speech = speech.with_progress(progress.clone());
        }
        if let Some(cancel) = &self.cancel {
            speech = speech.with_cancellation(cancel.clone());
        }
        speech
    }
}

#[async_trait]
impl CloudOperation for SpeechToText {
    type Args = SpeechToTextArgs;
    type Output = String;

    fn name(&self) -> &str {
        "GCloud Speech to Text"
    }

    async fn run(&self, input: &str, args: &SpeechToTextArgs) -> Result<String> {
        let credential = args.auth.credential()?;
        let request = TranscriptRequest::new(
            args.mode,
            input.trim(),
            args.language_code.as_str(),
            args.model.as_str(),
        );
        let output = match &args.destination {
            Destination::Return => None,
            Destination::WriteToGcs { bucket } => Some(OutputTarget::new(bucket.as_str())),
        };

        self.speech_client(args)
            .transcribe(&request, &credential, output.as_ref())
            .await
    }
}
