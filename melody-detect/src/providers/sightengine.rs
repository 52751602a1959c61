//! Sightengine AI-generated audio check (synchronous)
//!
//! Credentials travel either as `api_user`/`api_secret` form fields or as a
//! bearer key. Three response layouts are accepted, checked in order:
//! `type.ai_generated`, `result.ai_probability`, `ai_probability`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::http::{decode, ProviderHttp};
use super::normalize::unit_score;
use super::{ProviderAdapter, ProviderError, Submission};
use crate::models::{DetectionOutcome, DetectionRequest};

pub const PROVIDER_ID: &str = "sightengine";

#[derive(Debug, Deserialize)]
struct SightengineResponse {
    #[serde(default, rename = "type")]
    kind: Option<TypeSection>,
    #[serde(default)]
    result: Option<ResultSection>,
    #[serde(default)]
    ai_probability: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TypeSection {
    #[serde(default)]
    ai_generated: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResultSection {
    #[serde(default)]
    ai_probability: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum SightengineAuth {
    /// `api_user` + `api_secret` multipart fields
    UserSecret { api_user: String, api_secret: String },
    Bearer(String),
}

pub struct SightengineClient {
    http: ProviderHttp,
    api_url: String,
    auth: SightengineAuth,
}

impl SightengineClient {
    pub fn new(http: ProviderHttp, api_url: impl Into<String>, auth: SightengineAuth) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            auth,
        }
    }
}

#[async_trait]
impl ProviderAdapter for SightengineClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn submit(&self, request: &DetectionRequest) -> Result<Submission, ProviderError> {
        let mut form = self.http.audio_form("media", request)?;
        let call = self.http.client().post(&self.api_url);

        let call = match &self.auth {
            SightengineAuth::UserSecret {
                api_user,
                api_secret,
            } => {
                form = form
                    .text("api_user", api_user.clone())
                    .text("api_secret", api_secret.clone());
                call
            }
            SightengineAuth::Bearer(key) => call.bearer_auth(key),
        };

        let raw = self.http.send_json(call.multipart(form)).await?;
        let outcome = decode_response(raw)?;

        tracing::info!(
            provider = PROVIDER_ID,
            ai_probability = outcome.ai_probability,
            "Sightengine result received"
        );

        Ok(Submission::Completed(outcome))
    }
}

pub fn decode_response(raw: Value) -> Result<DetectionOutcome, ProviderError> {
    let response: SightengineResponse = decode(PROVIDER_ID, &raw)?;

    let found = response
        .kind
        .and_then(|t| t.ai_generated)
        .map(|v| ("type.ai_generated", v))
        .or_else(|| {
            response
                .result
                .and_then(|r| r.ai_probability)
                .map(|v| ("result.ai_probability", v))
        })
        .or_else(|| response.ai_probability.map(|v| ("ai_probability", v)));

    let Some((field, value)) = found else {
        return Err(ProviderError::protocol(
            PROVIDER_ID,
            "response carries no AI probability field",
        ));
    };

    let probability = unit_score(PROVIDER_ID, field, value)?;
    Ok(DetectionOutcome::new(PROVIDER_ID, probability, raw))
}
