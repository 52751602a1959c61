//! Hive AI-generated audio detector (synchronous)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::http::{decode, ProviderHttp};
use super::normalize::unit_score;
use super::{ProviderAdapter, ProviderError, Submission};
use crate::models::{DetectionOutcome, DetectionRequest};

pub const PROVIDER_ID: &str = "hive";

/// Either per-chunk scores or a single top-level probability
#[derive(Debug, Deserialize)]
struct HiveResponse {
    #[serde(default)]
    chunks: Vec<HiveChunk>,
    #[serde(default)]
    ai_probability: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HiveChunk {
    #[serde(default)]
    score: Value,
}

/// How the request is authorized
#[derive(Debug, Clone)]
pub enum HiveAuth {
    /// Sent verbatim as the `Authorization` header
    RawHeader(String),
    /// Sent as `Authorization: Bearer <key>`
    Bearer(String),
}

pub struct HiveClient {
    http: ProviderHttp,
    api_url: String,
    auth: HiveAuth,
}

impl HiveClient {
    pub fn new(http: ProviderHttp, api_url: impl Into<String>, auth: HiveAuth) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            auth,
        }
    }
}

#[async_trait]
impl ProviderAdapter for HiveClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn submit(&self, request: &DetectionRequest) -> Result<Submission, ProviderError> {
        let call = self
            .http
            .client()
            .post(&self.api_url)
            .multipart(self.http.audio_form("media", request)?);

        let call = match &self.auth {
            HiveAuth::RawHeader(value) => call.header(reqwest::header::AUTHORIZATION, value),
            HiveAuth::Bearer(key) => call.bearer_auth(key),
        };

        let raw = self.http.send_json(call).await?;
        let outcome = decode_response(raw)?;

        tracing::info!(
            provider = PROVIDER_ID,
            ai_probability = outcome.ai_probability,
            "Hive result received"
        );

        Ok(Submission::Completed(outcome))
    }
}

/// Mean of numeric chunk scores, else the top-level `ai_probability`
pub fn decode_response(raw: Value) -> Result<DetectionOutcome, ProviderError> {
    let response: HiveResponse = decode(PROVIDER_ID, &raw)?;

    let scores: Vec<f64> = response
        .chunks
        .iter()
        .filter_map(|chunk| chunk.score.as_f64())
        .collect();

    let probability = if !scores.is_empty() {
        scores.iter().sum::<f64>() / scores.len() as f64
    } else if let Some(p) = response.ai_probability {
        p
    } else {
        return Err(ProviderError::protocol(
            PROVIDER_ID,
            "response has neither chunk scores nor ai_probability",
        ));
    };

    let probability = unit_score(PROVIDER_ID, "ai_probability", probability)?;
    Ok(DetectionOutcome::new(PROVIDER_ID, probability, raw))
}
