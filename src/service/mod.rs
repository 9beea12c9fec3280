//! Remote key service boundary.
//!
//! The synchronizer only needs [`RemoteKeyService::fetch`]; the publish
//! operations live on the same trait because production clients talk to
//! the same backend for both.

use crate::core::DayDate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpKeyService;

/// Errors from talking to the key service.
///
/// Payloads are strings so one error can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Request body could not be encoded
    #[error("encoding error: {0}")]
    Encoding(String),
    /// Connection, timeout, or other transport failure
    #[error("transport error: {0}")]
    Transport(String),
    /// Server returned an error response
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// Server response could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    /// Whether trying again later may succeed.
    ///
    /// Retrying is up to the caller; the synchronizer never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Transport(_) => true,
            NetworkError::Server { status, .. } => {
                matches!(*status, 408 | 425 | 429 | 500..=599)
            }
            NetworkError::Encoding(_) | NetworkError::InvalidResponse(_) => false,
        }
    }
}

/// One day's published keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBatch {
    /// Raw payload, `None` when nothing has been published for the day
    pub data: Option<Vec<u8>>,
    /// Instant up to which the server has published data
    pub published_until: Option<DateTime<Utc>>,
}

impl KeyBatch {
    pub fn new(data: Option<Vec<u8>>, published_until: Option<DateTime<Utc>>) -> Self {
        Self {
            data,
            published_until,
        }
    }

    /// Batch with no keys.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Payload bytes, treating an empty body like a missing one.
    pub fn payload(&self) -> Option<&[u8]> {
        self.data.as_deref().filter(|bytes| !bytes.is_empty())
    }
}

/// A key reported as belonging to a known case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposeeModel {
    /// Base64-encoded key material
    pub key: String,
    /// First day the key was in use
    pub key_date: DayDate,
}

/// How a publish request proves it is authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authorization
    None,
    /// Bearer token from a health authority
    HtmlToken(String),
    /// Opaque value placed verbatim in the `Authorization` header
    Header(String),
}

impl AuthMethod {
    /// Value for the `Authorization` header, if any.
    pub fn authorization(&self) -> Option<String> {
        match self {
            AuthMethod::None => None,
            AuthMethod::HtmlToken(token) => Some(format!("Bearer {token}")),
            AuthMethod::Header(value) => Some(value.clone()),
        }
    }
}

/// A publish that still expects a follow-up delayed key upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingPublish {
    /// Day the delayed key belongs to
    pub day: DayDate,
    /// Token authorizing the delayed upload
    pub token: String,
}

/// The key uploaded the day after a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayedKeyModel {
    /// Base64-encoded key material
    pub key: String,
    /// Day the key was in use
    pub key_date: DayDate,
}

/// Access to published known-case keys.
#[async_trait]
pub trait RemoteKeyService: Send + Sync {
    /// Fetch the keys published for `day`.
    async fn fetch(&self, day: DayDate) -> Result<KeyBatch, NetworkError>;

    /// Publish own keys after a positive diagnosis.
    async fn publish(
        &self,
        exposees: &[ExposeeModel],
        auth: &AuthMethod,
    ) -> Result<OutstandingPublish, NetworkError>;

    /// Upload the key that was still in use at publish time.
    async fn publish_delayed(&self, key: &DelayedKeyModel, token: &str)
        -> Result<(), NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_no_payload() {
        assert_eq!(KeyBatch::new(Some(Vec::new()), None).payload(), None);
        assert_eq!(KeyBatch::empty().payload(), None);
        assert_eq!(
            KeyBatch::new(Some(vec![1, 2]), None).payload(),
            Some(&[1u8, 2][..])
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(NetworkError::Transport("timeout".into()).is_retryable());
        assert!(NetworkError::Server {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!NetworkError::Server {
            status: 404,
            message: String::new()
        }
        .is_retryable());
        assert!(!NetworkError::Encoding("bad".into()).is_retryable());
    }

    #[test]
    fn test_auth_header() {
        assert_eq!(AuthMethod::None.authorization(), None);
        assert_eq!(
            AuthMethod::HtmlToken("abc".into()).authorization(),
            Some("Bearer abc".to_string())
        );
    }
}
