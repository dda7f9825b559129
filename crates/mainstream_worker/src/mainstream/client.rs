use crate::domain::{
    scalar_to_string, BatchEnvelope, FetchWindow, LatestReading, UpstreamTelemetryClient,
};
use crate::mainstream::{translate_message, BatchRequest, LatestRequest};
use async_trait::async_trait;
use common::domain::{Device, DomainError, DomainResult};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct MainstreamClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl MainstreamClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// HTTP client for the vendor's batch and latest endpoints
#[derive(Debug, Clone)]
pub struct MainstreamHttpClient {
    base_url: String,
    http: reqwest::Client,
}

impl MainstreamHttpClient {
    pub fn new(config: MainstreamClientConfig) -> DomainResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DomainError::InvalidConfiguration(format!("http client: {e}")))?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl UpstreamTelemetryClient for MainstreamHttpClient {
    #[instrument(skip(self, devices), fields(devices = devices.len()))]
    async fn fetch_batch(
        &self,
        devices: &[Device],
        window: FetchWindow,
    ) -> DomainResult<BatchEnvelope> {
        let response = self
            .http
            .post(self.endpoint("batch"))
            .json(&BatchRequest::new(devices, window))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = batch_error_message(&text);
            warn!(status = status.as_u16(), message = %message, "main stream batch failed");
            return Err(DomainError::UpstreamRequestFailed(status.as_u16(), message));
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| DomainError::UpstreamDecode(format!("batch response: {e}")))?;
        debug!(status = status.as_u16(), "main stream batch received");
        Ok(BatchEnvelope::from_json(payload))
    }

    #[instrument(skip(self, device), fields(device_id = %device.device_id))]
    async fn fetch_latest(&self, device: &Device) -> DomainResult<LatestReading> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let response = self
            .http
            .post(self.endpoint("latest"))
            .query(&[("ts", now_ms)])
            .header(CACHE_CONTROL, "no-cache, no-store, max-age=0")
            .header(PRAGMA, "no-cache")
            .json(&LatestRequest::from(device))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "main stream latest unavailable");
            return Ok(LatestReading::empty(i64::from(status.as_u16())));
        }

        let text = response.text().await.map_err(transport_error)?;
        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| DomainError::UpstreamDecode(format!("latest response: {e}")))?;

        Ok(latest_from_payload(&payload, i64::from(status.as_u16())))
    }
}

fn normalize_base_url(base_url: &str) -> DomainResult<String> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidConfiguration(
            "main stream base url is empty".to_string(),
        ));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn transport_error(err: reqwest::Error) -> DomainError {
    DomainError::UpstreamTransport(err.to_string())
}

/// A JSON `message` is translated; other JSON keeps the raw text; non-JSON
/// text is translated as a whole.
fn batch_error_message(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(json) => match json
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
        {
            Some(message) => translate_message(message),
            None => text.to_string(),
        },
        Err(_) => translate_message(text),
    }
}

/// First element of the first entry whose `data` array is non-empty
fn latest_from_payload(payload: &Value, http_status: i64) -> LatestReading {
    let code = payload
        .get("code")
        .and_then(Value::as_i64)
        .unwrap_or(http_status);

    let first = payload
        .get("data")
        .and_then(Value::as_array)
        .and_then(|entries| {
            entries.iter().find_map(|entry| {
                entry
                    .get("data")
                    .and_then(Value::as_array)
                    .and_then(|items| items.first())
            })
        });

    match first {
        Some(item) => LatestReading {
            code,
            monitor_value: scalar_to_string(item.get("monitorValue")),
            monitor_time: scalar_to_string(item.get("monitorTime")),
        },
        None => LatestReading::empty(code),
    }
}
