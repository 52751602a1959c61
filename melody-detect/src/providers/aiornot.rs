//! AI or Not music detector (synchronous)
//!
//! Single multipart POST; the report carries a binary verdict, its
//! confidence, and per-generator scores.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::http::{decode, ProviderHttp};
use super::normalize::{orient, unit_score, Verdict};
use super::{ProviderAdapter, ProviderError, Submission};
use crate::models::{DetectionOutcome, DetectionRequest, LabelScore};

pub const PROVIDER_ID: &str = "aiornot";
pub const DEFAULT_API_URL: &str = "https://api.aiornot.com/v1/reports/music";

#[derive(Debug, Deserialize)]
struct AiOrNotResponse {
    report: AiOrNotReport,
}

#[derive(Debug, Deserialize)]
struct AiOrNotReport {
    verdict: Verdict,
    confidence: f64,
    /// Generator name → score; non-numeric entries are ignored
    #[serde(default)]
    generator: Option<Map<String, Value>>,
}

pub struct AiOrNotClient {
    http: ProviderHttp,
    api_url: String,
    api_key: String,
}

impl AiOrNotClient {
    pub fn new(http: ProviderHttp, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AiOrNotClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn submit(&self, request: &DetectionRequest) -> Result<Submission, ProviderError> {
        tracing::debug!(
            provider = PROVIDER_ID,
            filename = %request.filename(),
            bytes = request.size(),
            "Submitting to AI or Not"
        );

        let call = self
            .http
            .client()
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(self.http.audio_form("file", request)?);

        let raw = self.http.send_json(call).await?;
        let outcome = decode_report(raw)?;

        tracing::info!(
            provider = PROVIDER_ID,
            ai_probability = outcome.ai_probability,
            "AI or Not report received"
        );

        Ok(Submission::Completed(outcome))
    }
}

/// Decode an AI or Not report into the canonical outcome
pub fn decode_report(raw: Value) -> Result<DetectionOutcome, ProviderError> {
    let response: AiOrNotResponse = decode(PROVIDER_ID, &raw)?;
    let report = response.report;

    let confidence = unit_score(PROVIDER_ID, "report.confidence", report.confidence)?;
    let ai_probability = orient(report.verdict, confidence);

    let mut labels: Vec<LabelScore> = report
        .generator
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, score)| score.as_f64().map(|score| LabelScore { name, score }))
        .collect();
    labels.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(DetectionOutcome::new(PROVIDER_ID, ai_probability, raw)
        .with_confidence(confidence)
        .with_labels(labels))
}
