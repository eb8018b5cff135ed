//! Google Cloud Storage and Speech-to-Text operations.
//!
//! The [`gcloud`] module holds the REST clients (credential application,
//! Cloud Storage, long-running operation polling and transcription); the
//! [`operations`] module wraps them as user-facing operations with textual
//! input and output.

pub mod error;
pub mod gcloud;
pub mod operations;

pub use error::{GcpError, Result};
