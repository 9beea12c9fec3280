//! HTTP client for the known-case key service.

use crate::config::SyncDescriptor;
use crate::core::DayDate;
use crate::service::{
    AuthMethod, DelayedKeyModel, ExposeeModel, KeyBatch, NetworkError, OutstandingPublish,
    RemoteKeyService,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::time::Duration;

/// Response header carrying the publication watermark in epoch milliseconds.
pub const PUBLISHED_UNTIL_HEADER: &str = "x-published-until";

/// Request timeout for every call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Publish request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
    app_id: &'a str,
    keys: &'a [ExposeeModel],
}

/// Key service client backed by reqwest.
pub struct HttpKeyService {
    descriptor: SyncDescriptor,
    client: reqwest::Client,
}

impl HttpKeyService {
    /// Create a new client for the given endpoints.
    pub fn new(descriptor: SyncDescriptor) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("proximity-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        Ok(Self { descriptor, client })
    }

    /// URL of one day's key batch.
    pub fn fetch_url(&self, day: DayDate) -> String {
        format!(
            "{}/v1/exposed/{}",
            self.descriptor.bucket_base_url.trim_end_matches('/'),
            day.timestamp_millis()
        )
    }

    /// URL for publishing own keys.
    pub fn publish_url(&self) -> String {
        format!(
            "{}/v1/exposed",
            self.descriptor.report_base_url.trim_end_matches('/')
        )
    }

    /// URL for the delayed key upload.
    pub fn publish_delayed_url(&self) -> String {
        format!(
            "{}/v1/exposednextday",
            self.descriptor.report_base_url.trim_end_matches('/')
        )
    }

    pub fn descriptor(&self) -> &SyncDescriptor {
        &self.descriptor
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, NetworkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(NetworkError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

/// Parse the publication watermark header, given in epoch milliseconds.
fn parse_published_until(value: Option<&str>) -> Result<Option<DateTime<Utc>>, NetworkError> {
    let Some(value) = value else {
        return Ok(None);
    };

    value
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .map(Some)
        .ok_or_else(|| {
            NetworkError::InvalidResponse(format!(
                "unparseable {PUBLISHED_UNTIL_HEADER} header: {value:?}"
            ))
        })
}

/// An empty body means nothing was published for the day.
fn batch_from_body(body: &[u8], published_until: Option<DateTime<Utc>>) -> KeyBatch {
    let data = if body.is_empty() {
        None
    } else {
        Some(body.to_vec())
    };
    KeyBatch::new(data, published_until)
}

#[async_trait]
impl RemoteKeyService for HttpKeyService {
    async fn fetch(&self, day: DayDate) -> Result<KeyBatch, NetworkError> {
        let response = self
            .client
            .get(self.fetch_url(day))
            .header("Accept", "application/octet-stream")
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        let response = Self::check_status(response).await?;

        let published_until = parse_published_until(
            response
                .headers()
                .get(PUBLISHED_UNTIL_HEADER)
                .map(|value| value.to_str().unwrap_or_default()),
        )?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(batch_from_body(&[], published_until));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        Ok(batch_from_body(&body, published_until))
    }

    async fn publish(
        &self,
        exposees: &[ExposeeModel],
        auth: &AuthMethod,
    ) -> Result<OutstandingPublish, NetworkError> {
        let body = serde_json::to_vec(&PublishRequest {
            app_id: &self.descriptor.app_id,
            keys: exposees,
        })
        .map_err(|e| NetworkError::Encoding(e.to_string()))?;

        let mut request = self
            .client
            .post(self.publish_url())
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(authorization) = auth.authorization() {
            request = request.header("Authorization", authorization);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let token = response
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start_matches("Bearer ").to_string())
            .ok_or_else(|| {
                NetworkError::InvalidResponse("publish response carries no token".to_string())
            })?;

        Ok(OutstandingPublish {
            day: DayDate::from_timestamp(Utc::now()),
            token,
        })
    }

    async fn publish_delayed(
        &self,
        key: &DelayedKeyModel,
        token: &str,
    ) -> Result<(), NetworkError> {
        let response = self
            .client
            .post(self.publish_delayed_url())
            .header("Authorization", format!("Bearer {token}"))
            .json(key)
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }
}
