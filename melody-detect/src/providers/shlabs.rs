//! SH Labs AI music detector (synchronous)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::http::{decode, ProviderHttp};
use super::normalize::unit_score;
use super::{ProviderAdapter, ProviderError, Submission};
use crate::models::{DetectionOutcome, DetectionRequest};

pub const PROVIDER_ID: &str = "shlabs";

#[derive(Debug, Deserialize)]
struct ShLabsResponse {
    #[serde(default)]
    ai_probability: Option<f64>,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum ShLabsAuth {
    /// Full `Authorization` header value
    RawHeader(String),
    /// Sent as `X-Api-Key`
    ApiKey(String),
}

pub struct ShLabsClient {
    http: ProviderHttp,
    api_url: String,
    auth: ShLabsAuth,
}

impl ShLabsClient {
    pub fn new(http: ProviderHttp, api_url: impl Into<String>, auth: ShLabsAuth) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            auth,
        }
    }
}

#[async_trait]
impl ProviderAdapter for ShLabsClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn submit(&self, request: &DetectionRequest) -> Result<Submission, ProviderError> {
        let call = self
            .http
            .client()
            .post(&self.api_url)
            .multipart(self.http.audio_form("file", request)?);

        let call = match &self.auth {
            ShLabsAuth::RawHeader(value) => call.header(reqwest::header::AUTHORIZATION, value),
            ShLabsAuth::ApiKey(key) => call.header("X-Api-Key", key),
        };

        let raw = self.http.send_json(call).await?;
        let outcome = decode_response(raw)?;

        tracing::info!(
            provider = PROVIDER_ID,
            ai_probability = outcome.ai_probability,
            "SH Labs result received"
        );

        Ok(Submission::Completed(outcome))
    }
}

/// `ai_probability`, else `score`
pub fn decode_response(raw: Value) -> Result<DetectionOutcome, ProviderError> {
    let response: ShLabsResponse = decode(PROVIDER_ID, &raw)?;

    let (field, value) = match (response.ai_probability, response.score) {
        (Some(p), _) => ("ai_probability", p),
        (None, Some(s)) => ("score", s),
        (None, None) => {
            return Err(ProviderError::protocol(
                PROVIDER_ID,
                "response has neither ai_probability nor score",
            ))
        }
    };

    let probability = unit_score(PROVIDER_ID, field, value)?;
    Ok(DetectionOutcome::new(PROVIDER_ID, probability, raw))
}
