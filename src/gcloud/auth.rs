//! Credential handling for Google Cloud REST calls.
//!
//! A [`Credential`] is applied to every outbound request either as a `key=`
//! query parameter (API keys) or as a bearer `Authorization` header (OAuth
//! access tokens). OAuth requests may additionally carry a billing project in
//! the `x-goog-user-project` header, which is required when the token comes
//! from Application Default Credentials.
//!
//! Auth strings arrive from the outside world in one of several textual
//! encodings; [`AuthString::decode`] resolves them to the plain secret before
//! a `Credential` is built.

use std::fmt;
use std::str::FromStr;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::error::{GcpError, Result};

/// Header naming the project billed for an OAuth request.
pub const QUOTA_PROJECT_HEADER: &str = "x-goog-user-project";

pub(crate) const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    ApiKey,
    OAuthToken,
}

impl FromStr for AuthKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace([' ', '_'], "-").as_str() {
            "api-key" | "apikey" | "key" => Ok(Self::ApiKey),
            "oauth-token" | "oauth" | "token" | "bearer" => Ok(Self::OAuthToken),
            other => Err(format!(
                "unknown auth type '{other}' (expected api-key or oauth-token)"
            )),
        }
    }
}

/// A fully decoded credential, supplied per call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub kind: AuthKind,
    pub secret: String,
    pub quota_project: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("secret", &"<redacted>")
            .field("quota_project", &self.quota_project)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizedTarget {
    pub url: String,
    pub headers: HeaderMap,
}

impl Credential {
    pub fn api_key(secret: impl Into<String>) -> Self {
        Self {
            kind: AuthKind::ApiKey,
            secret: secret.into(),
            quota_project: None,
        }
    }

    pub fn oauth_token(secret: impl Into<String>) -> Self {
        Self {
            kind: AuthKind::OAuthToken,
            secret: secret.into(),
            quota_project: None,
        }
    }

    /// Sets the billing project. An empty string clears it.
    pub fn with_quota_project(mut self, project: impl Into<String>) -> Self {
        let project = project.into();
        self.quota_project = if project.trim().is_empty() {
            None
        } else {
            Some(project.trim().to_string())
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(GcpError::validation(
                "Please provide a valid GCP Auth String (API Key or OAuth Token).",
            ));
        }
        Ok(())
    }

    pub fn apply(&self, url: &str, mut headers: HeaderMap) -> Result<AuthorizedTarget> {
        self.validate()?;

        let mut url = url.to_string();
        match self.kind {
            AuthKind::ApiKey => {
                let separator = if url.contains('?') { '&' } else { '?' };
                url.push(separator);
                url.push_str("key=");
                url.push_str(&urlencoding::encode(&self.secret));
            }
            AuthKind::OAuthToken => {
                let mut bearer = HeaderValue::from_str(&format!("Bearer {}", self.secret))
                    .map_err(|_| {
                        GcpError::validation("OAuth token contains characters not allowed in a header")
                    })?;
                bearer.set_sensitive(true);
                headers.insert(AUTHORIZATION, bearer);

                if let Some(project) = &self.quota_project {
                    let value = HeaderValue::from_str(project).map_err(|_| {
                        GcpError::validation("Quota project contains invalid characters")
                    })?;
                    headers.insert(HeaderName::from_static(QUOTA_PROJECT_HEADER), value);
                }
            }
        }

        Ok(AuthorizedTarget { url, headers })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretEncoding {
    #[default]
    Utf8,
    Latin1,
    Base64,
    Hex,
}

impl FromStr for SecretEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "utf8" => Ok(Self::Utf8),
            "latin1" => Ok(Self::Latin1),
            "base64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            other => Err(format!(
                "unknown encoding '{other}' (expected utf8, latin1, base64 or hex)"
            )),
        }
    }
}

/// An auth string as typed by the user, tagged with its encoding.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AuthString {
    pub encoding: SecretEncoding,
    pub raw: String,
}

impl fmt::Debug for AuthString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthString")
            .field("encoding", &self.encoding)
            .field("raw", &"<redacted>")
            .finish()
    }
}

impl AuthString {
    pub fn new(encoding: SecretEncoding, raw: impl Into<String>) -> Self {
        Self {
            encoding,
            raw: raw.into(),
        }
    }

    pub fn utf8(raw: impl Into<String>) -> Self {
        Self::new(SecretEncoding::Utf8, raw)
    }

    pub fn decode(&self) -> Result<String> {
        let decoded = match self.encoding {
            SecretEncoding::Utf8 => self.raw.clone(),
            SecretEncoding::Latin1 => {
                if self.raw.chars().any(|c| u32::from(c) > 0xFF) {
                    return Err(GcpError::validation(
                        "Auth string contains characters outside Latin-1",
                    ));
                }
                self.raw.clone()
            }
            SecretEncoding::Base64 => {
                let bytes = LENIENT_BASE64
                    .decode(self.raw.trim())
                    .map_err(|e| GcpError::validation(format!("Invalid Base64 auth string: {e}")))?;
                utf8_secret(bytes)?
            }
            SecretEncoding::Hex => {
                let compact: String = self.raw.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = hex::decode(compact)
                    .map_err(|e| GcpError::validation(format!("Invalid hex auth string: {e}")))?;
                utf8_secret(bytes)?
            }
        };

        Ok(decoded.trim().to_string())
    }
}

fn utf8_secret(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|_| GcpError::validation("Decoded auth string is not valid UTF-8"))
}
