use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cloudscribe::gcloud::{
    AuthKind, AuthString, Endpoints, GoogleCloudClient, InputMode, PollProgress, SecretEncoding,
    SPEECH_ROOT, STORAGE_ROOT, STORAGE_UPLOAD_ROOT,
};
use cloudscribe::operations::{
    AuthArgs, CloudOperation, Destination, ListBucket, ListBucketArgs, ListFormat, ReadFile,
    SpeechToText, SpeechToTextArgs, DEFAULT_OUTPUT_BUCKET,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    auth: AuthOptions,

    #[command(flatten)]
    endpoints: EndpointOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct AuthOptions {
    /// How the auth string is sent: api-key or oauth-token
    #[arg(long, env = "GCP_AUTH_TYPE", default_value = "api-key", global = true)]
    auth_type: AuthKind,

    /// API key or OAuth access token
    #[arg(long, env = "GCP_AUTH_STRING", hide_env_values = true, global = true)]
    auth_string: Option<String>,

    /// Encoding of the auth string: utf8, latin1, base64 or hex
    #[arg(long, env = "GCP_AUTH_ENCODING", default_value = "utf8", global = true)]
    auth_encoding: SecretEncoding,

    /// Billing project for OAuth tokens (x-goog-user-project)
    #[arg(long, env = "GCP_QUOTA_PROJECT", default_value = "", global = true)]
    quota_project: String,
}

#[derive(clap::Args)]
struct EndpointOptions {
    #[arg(long, env = "GCS_STORAGE_ROOT", default_value = STORAGE_ROOT, hide = true)]
    storage_root: String,

    #[arg(long, env = "GCS_UPLOAD_ROOT", default_value = STORAGE_UPLOAD_ROOT, hide = true)]
    storage_upload_root: String,

    #[arg(long, env = "GCP_SPEECH_ROOT", default_value = SPEECH_ROOT, hide = true)]
    speech_root: String,
}

#[derive(Subcommand)]
enum Command {
    /// List objects in a bucket (bucket name or gs:// URI)
    List {
        bucket: String,

        /// Only list objects under this prefix
        #[arg(long, default_value = "audio/")]
        prefix: String,

        /// Output format: uris, filenames or json
        #[arg(long, default_value = "uris")]
        format: ListFormat,
    },

    /// Download an object
    Read {
        /// gs://bucket/path/to/object
        uri: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Transcribe audio with Speech-to-Text
    Transcribe {
        /// gs:// URI or Base64 audio; "-" reads it from stdin
        input: String,

        /// Input mode: gcs-uri or base64
        #[arg(long, default_value = "gcs-uri")]
        mode: InputMode,

        #[arg(long, default_value = "en-US")]
        language: String,

        /// latest_long, latest_short, telephony, medical_dictation or default
        #[arg(long, default_value = "latest_long")]
        model: String,

        /// Write the transcript to this bucket (bare flag: the default bucket)
        /// and print its gs:// URI
        #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_OUTPUT_BUCKET)]
        output_bucket: Option<String>,

        #[arg(long, default_value_t = 30.0)]
        max_poll_minutes: f64,
    },
}

impl AuthOptions {
    fn auth_args(&self) -> Result<AuthArgs> {
        let raw = self.auth_string.clone().context(
            "GCP_AUTH_STRING environment variable not set or --auth-string not provided",
        )?;
        Ok(
            AuthArgs::new(self.auth_type, AuthString::new(self.auth_encoding, raw))
                .with_quota_project(self.quota_project.as_str()),
        )
    }
}

impl EndpointOptions {
    fn client(&self) -> GoogleCloudClient {
        GoogleCloudClient::new(Endpoints {
            storage_root: self.storage_root.trim_end_matches('/').to_string(),
            storage_upload_root: self.storage_upload_root.trim_end_matches('/').to_string(),
            speech_root: self.speech_root.trim_end_matches('/').to_string(),
        })
    }
}

async fn read_input(input: String) -> Result<String> {
    if input != "-" {
        return Ok(input);
    }
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("Failed to read input from stdin")?;
    Ok(buf)
}

/// Logs poll progress until every sender is gone; returns the event count.
async fn log_progress(mut progress_rx: UnboundedReceiver<PollProgress>) -> usize {
    let mut events = 0;
    while let Some(progress) = progress_rx.recv().await {
        events += 1;
        info!(
            operation = %progress.operation_id,
            "Still transcribing... {}s elapsed",
            progress.elapsed_secs()
        );
    }
    events
}

async fn main_async() -> Result<()> {
    if tokio::fs::try_exists(".env").await? {
        dotenvy::dotenv()?;
        info!("loaded environment from .env");
    }

    let args = Args::parse();
    let auth = args.auth.auth_args()?;
    let client = args.endpoints.client();

    match args.command {
        Command::List {
            bucket,
            prefix,
            format,
        } => {
            let op = ListBucket::new(client);
            let op_args = ListBucketArgs {
                prefix,
                format,
                auth,
            };
            let listing = op
                .run(&bucket, &op_args)
                .await
                .with_context(|| format!("{} failed", op.name()))?;
            println!("{}", listing);
        }
        Command::Read { uri, output } => {
            let op = ReadFile::new(client);
            let bytes = op
                .run(&uri, &auth)
                .await
                .with_context(|| format!("{} failed", op.name()))?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), bytes = bytes.len(), "Saved object");
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&bytes).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::Transcribe {
            input,
            mode,
            language,
            model,
            output_bucket,
            max_poll_minutes,
        } => {
            let input = read_input(input).await?;
            let cancel_token = CancellationToken::new();
            let (progress_tx, progress_rx) =
                tokio::sync::mpsc::unbounded_channel::<PollProgress>();
            let progress_handle = tokio::spawn(log_progress(progress_rx));

            tokio::spawn({
                let cancel_token = cancel_token.clone();
                async move {
                    tokio::select! {
                        _ = cancel_token.cancelled() => {}
                        _ = tokio::signal::ctrl_c() => {
                            info!("Interrupted, cancelling transcription");
                            cancel_token.cancel();
                        }
                    }
                }
            });

            let op = SpeechToText::new(client)
                .with_progress(progress_tx)
                .with_cancellation(cancel_token.clone());
            let op_args = SpeechToTextArgs {
                mode,
                language_code: language,
                model,
                destination: match output_bucket {
                    Some(bucket) => Destination::WriteToGcs { bucket },
                    None => Destination::Return,
                },
                max_poll_minutes,
                auth,
            };

            let result = op.run(&input, &op_args).await;
            cancel_token.cancel();
            drop(op);
            let _ = progress_handle.await;

            let text = result.context("GCloud Speech to Text failed")?;
            println!("{}", text);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let result = rt.block_on(main_async());
    // stdin readers and signal listeners may still be parked
    rt.shutdown_background();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_log_progress_drains_until_senders_drop() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<PollProgress>();
        let handle = tokio::spawn(log_progress(rx));

        for secs in [10, 20] {
            tx.send(PollProgress {
                operation_id: "op-1".to_string(),
                elapsed: Duration::from_secs(secs),
            })
            .unwrap();
        }
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
    }

    #[test]
    fn test_output_bucket_flag_defaults_when_bare() {
        let args = Args::try_parse_from([
            "cloudscribe",
            "--auth-string",
            "k",
            "transcribe",
            "gs://b/a.mp3",
            "--output-bucket",
        ])
        .unwrap();

        match args.command {
            Command::Transcribe { output_bucket, .. } => {
                assert_eq!(output_bucket.as_deref(), Some(DEFAULT_OUTPUT_BUCKET))
            }
            _ => panic!("Expected transcribe"),
        }
    }
}
