//! Shared HTTP plumbing for provider adapters
//!
//! Every outbound call goes through [`ProviderHttp`], which applies the
//! optional per-provider rate limit and maps failures onto the
//! [`ProviderError`] taxonomy:
//! - send failure → Transport
//! - 401 → Auth
//! - any other non-2xx → Protocol (status + truncated body)
//! - undecodable JSON → Protocol

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::ProviderError;
use crate::models::DetectionRequest;

const USER_AGENT: &str = concat!("melody-detect/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Client-side settings for one provider
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub timeout: Duration,
    /// Outbound request budget; None disables rate limiting
    pub requests_per_second: Option<NonZeroU32>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            requests_per_second: None,
        }
    }
}

/// HTTP client bound to one provider id
#[derive(Clone)]
pub struct ProviderHttp {
    provider: &'static str,
    client: reqwest::Client,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl ProviderHttp {
    pub fn new(provider: &'static str, settings: HttpSettings) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::transport(provider, e))?;

        let rate_limiter = settings
            .requests_per_second
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            provider,
            client,
            rate_limiter,
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Multipart form carrying the audio bytes under `field_name`
    pub fn audio_form(&self, field_name: &'static str, request: &DetectionRequest) -> Result<Form, ProviderError> {
        let part = Part::stream_with_length(request.content(), request.size() as u64)
            .file_name(request.filename().to_string())
            .mime_str(request.content_type().essence_str())
            .map_err(|e| ProviderError::transport(self.provider, e))?;

        Ok(Form::new().part(field_name, part))
    }

    /// Send and parse a JSON response body
    pub async fn send_json(&self, request: RequestBuilder) -> Result<Value, ProviderError> {
        let response = self.send(request).await?;
        response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                ProviderError::protocol(self.provider, format!("invalid JSON body: {}", e))
            } else {
                ProviderError::transport(self.provider, e)
            }
        })
    }

    /// Send, checking only the status code
    pub async fn send_empty(&self, request: RequestBuilder) -> Result<(), ProviderError> {
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::transport(self.provider, e))?;

        self.check_status(response).await
    }

    async fn check_status(&self, response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();

        tracing::debug!(
            provider = self.provider,
            status = status.as_u16(),
            "Provider returned error status"
        );

        if status == StatusCode::UNAUTHORIZED {
            Err(ProviderError::auth(
                self.provider,
                format!("HTTP {}: {}", status.as_u16(), body),
            ))
        } else {
            Err(ProviderError::protocol(
                self.provider,
                format!("HTTP {}: {}", status.as_u16(), body),
            ))
        }
    }
}

/// Decode a raw payload into a provider-specific schema, failing closed
pub fn decode<T: DeserializeOwned>(provider: &str, raw: &Value) -> Result<T, ProviderError> {
    T::deserialize(raw)
        .map_err(|e| ProviderError::protocol(provider, format!("unrecognized response shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Shape {
        value: f64,
    }

    #[test]
    fn test_decode_matching_shape() {
        let shape: Shape = decode("p", &json!({"value": 0.25})).unwrap();
        assert_eq!(shape.value, 0.25);
    }

    #[test]
    fn test_decode_fails_closed() {
        let err = decode::<Shape>("p", &json!({"other": 1})).unwrap_err();
        assert_eq!(err.kind(), melody_common::FailureKind::Protocol);
        assert!(err.to_string().contains("unrecognized response shape"));
    }

    #[test]
    fn test_client_creation() {
        let settings = HttpSettings {
            timeout: Duration::from_secs(5),
            requests_per_second: NonZeroU32::new(3),
        };
        let http = ProviderHttp::new("p", settings).unwrap();
        assert_eq!(http.provider(), "p");
        assert!(http.rate_limiter.is_some());
    }

    #[test]
    fn test_audio_form_builds_for_guessed_types() {
        let http = ProviderHttp::new("p", HttpSettings::default()).unwrap();
        for name in ["song.mp3", "take.flac", "noext"] {
            let request = DetectionRequest::new(name, vec![1u8, 2, 3]).unwrap();
            assert!(http.audio_form("file", &request).is_ok());
        }
    }
}
