//! IRCAM Amplify AI music detector (OAuth-gated polling)
//!
//! Submission is a three-step handshake, all under one bearer token:
//! 1. `POST {storage}/manager/` creates a storage object
//! 2. `PUT {storage}/{ias_id}/{filename}` uploads the audio bytes
//! 3. `POST {api}/aidetector/` registers a detector job for `ias://{ias_id}`
//!
//! `GET {api}/aidetector/{job_id}` is then polled until the job reports
//! `success`, `failed` or `error`.
//!
//! Tokens come from the shared [`TokenCache`]; every call runs through
//! [`TokenCache::with_credential`] so a 401 triggers one refresh + retry.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::http::{decode, ProviderHttp};
use super::normalize::{orient, unit_score, Verdict};
use super::{FetchStatus, PollPolicy, ProviderAdapter, ProviderError, ProviderMode, Submission};
use crate::models::{DetectionOutcome, DetectionRequest, LabelScore};
use crate::services::token_cache::{CredentialExchange, IssuedToken, TokenCache};

pub const PROVIDER_ID: &str = "ircam";

pub const DEFAULT_AUTH_URL: &str = "https://api.ircamamplify.io/oauth/token";
pub const DEFAULT_API_BASE_URL: &str = "https://api.ircamamplify.io";
pub const DEFAULT_STORAGE_BASE_URL: &str = "https://storage.ircamamplify.io";

/// Assumed token validity when the auth response omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(50 * 60);

/// Attempt ceiling for detector jobs
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Parsed IRCAM base URLs
#[derive(Debug, Clone)]
pub struct IrcamEndpoints {
    pub auth_url: Url,
    pub api_base_url: Url,
    pub storage_base_url: Url,
}

impl IrcamEndpoints {
    pub fn parse(auth_url: &str, api_base_url: &str, storage_base_url: &str) -> melody_common::Result<Self> {
        Ok(Self {
            auth_url: parse_base("auth_url", auth_url)?,
            api_base_url: parse_base("api_base_url", api_base_url)?,
            storage_base_url: parse_base("storage_base_url", storage_base_url)?,
        })
    }
}

fn parse_base(field: &str, value: &str) -> melody_common::Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| melody_common::Error::Config(format!("ircam {}: {}", field, e)))?;
    if url.cannot_be_a_base() {
        return Err(melody_common::Error::Config(format!(
            "ircam {}: not a base URL: {}",
            field, value
        )));
    }
    Ok(url)
}

/// `base` with `segments` appended to its path (each segment percent-encoded)
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

// ----------------------------------------------------------------------------
// Credential exchange
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// client_credentials grant against the IRCAM auth endpoint
pub struct IrcamCredentialExchange {
    http: ProviderHttp,
    auth_url: Url,
    client_id: String,
    client_secret: String,
}

impl IrcamCredentialExchange {
    pub fn new(
        http: ProviderHttp,
        auth_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl CredentialExchange for IrcamCredentialExchange {
    async fn exchange(&self) -> Result<IssuedToken, ProviderError> {
        let call = self.http.client().post(self.auth_url.clone()).json(&json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "grant_type": "client_credentials",
        }));

        let raw = self.http.send_json(call).await?;

        let response: TokenResponse = decode(PROVIDER_ID, &raw)?;
        if response.id_token.trim().is_empty() {
            return Err(ProviderError::protocol(PROVIDER_ID, "auth response has an empty id_token"));
        }

        Ok(IssuedToken {
            token: response.id_token,
            lifetime: response.expires_in.map(Duration::from_secs),
        })
    }
}

// ----------------------------------------------------------------------------
// Adapter
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IasObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    ulid: Option<String>,
    #[serde(default, rename = "iasId")]
    ias_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectorJob {
    id: String,
}

pub struct IrcamClient {
    http: ProviderHttp,
    endpoints: IrcamEndpoints,
    tokens: Arc<TokenCache>,
    poll_policy: PollPolicy,
}

impl IrcamClient {
    /// Create the adapter and register its credential exchange with `tokens`
    pub fn new(
        http: ProviderHttp,
        endpoints: IrcamEndpoints,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tokens: Arc<TokenCache>,
        poll_policy: PollPolicy,
    ) -> Self {
        let exchange = IrcamCredentialExchange::new(
            http.clone(),
            endpoints.auth_url.clone(),
            client_id,
            client_secret,
        );
        tokens.register(PROVIDER_ID, Arc::new(exchange), DEFAULT_TOKEN_LIFETIME);

        Self {
            http,
            endpoints,
            tokens,
            poll_policy,
        }
    }

    async fn create_storage_object(&self, token: &str) -> Result<String, ProviderError> {
        let url = endpoint(&self.endpoints.storage_base_url, &["manager", ""]);
        let call = self
            .http
            .client()
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");

        let raw = self.http.send_json(call).await?;
        let object: IasObject = decode(PROVIDER_ID, &raw)?;

        object
            .id
            .or(object.ulid)
            .or(object.ias_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::protocol(PROVIDER_ID, "storage object response has no id"))
    }

    async fn upload(&self, token: &str, ias_id: &str, request: &DetectionRequest) -> Result<(), ProviderError> {
        let url = endpoint(&self.endpoints.storage_base_url, &[ias_id, request.filename()]);
        let call = self
            .http
            .client()
            .put(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(request.content());

        self.http.send_empty(call).await
    }

    async fn start_job(&self, token: &str, ias_id: &str) -> Result<String, ProviderError> {
        let url = endpoint(&self.endpoints.api_base_url, &["aidetector", ""]);
        let call = self.http.client().post(url).bearer_auth(token).json(&json!({
            "audioUrlList": [format!("ias://{}", ias_id)],
            "timeAnalysis": false,
        }));

        let raw = self.http.send_json(call).await?;
        let job: DetectorJob = decode(PROVIDER_ID, &raw)?;
        Ok(job.id)
    }

    async fn handshake(&self, token: String, request: &DetectionRequest) -> Result<String, ProviderError> {
        let ias_id = self.create_storage_object(&token).await?;
        tracing::debug!(provider = PROVIDER_ID, ias_id = %ias_id, "Storage object created");

        self.upload(&token, &ias_id, request).await?;
        tracing::debug!(provider = PROVIDER_ID, ias_id = %ias_id, bytes = request.size(), "Audio uploaded");

        self.start_job(&token, &ias_id).await
    }

    async fn get_job(&self, token: String, job_id: &str) -> Result<Value, ProviderError> {
        let url = endpoint(&self.endpoints.api_base_url, &["aidetector", job_id]);
        let call = self
            .http
            .client()
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");

        self.http.send_json(call).await
    }
}

#[async_trait]
impl ProviderAdapter for IrcamClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn mode(&self) -> ProviderMode {
        ProviderMode::Polling
    }

    fn poll_policy(&self) -> PollPolicy {
        self.poll_policy
    }

    async fn submit(&self, request: &DetectionRequest) -> Result<Submission, ProviderError> {
        let job_id = self
            .tokens
            .with_credential(PROVIDER_ID, |token| self.handshake(token, request))
            .await?;

        tracing::info!(provider = PROVIDER_ID, external_job_id = %job_id, "Detector job registered");
        Ok(Submission::Enqueued {
            external_job_id: job_id,
        })
    }

    async fn fetch(&self, external_job_id: &str) -> Result<FetchStatus, ProviderError> {
        let raw = self
            .tokens
            .with_credential(PROVIDER_ID, |token| self.get_job(token, external_job_id))
            .await?;

        decode_job(raw)
    }
}

// ----------------------------------------------------------------------------
// Job decoding
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JobResponse {
    job_infos: JobInfos,
}

/// The report travels inside `job_infos` alongside the status
#[derive(Debug, Deserialize)]
struct JobInfos {
    job_status: String,
    #[serde(default)]
    report_info: Option<ReportInfo>,
}

#[derive(Debug, Deserialize)]
struct ReportInfo {
    report: Report,
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default, rename = "resultList")]
    result_list: Vec<DetectorResult>,
}

#[derive(Debug, Deserialize)]
struct DetectorResult {
    #[serde(rename = "isAi")]
    is_ai: bool,
    /// Percent, 0-100
    confidence: f64,
    #[serde(default, rename = "suspectedModel")]
    suspected_model: Option<String>,
}

/// Map a detector job document onto pending / terminal
pub fn decode_job(raw: Value) -> Result<FetchStatus, ProviderError> {
    let response: JobResponse = decode(PROVIDER_ID, &raw)?;
    let status = response.job_infos.job_status.to_ascii_lowercase();

    match status.as_str() {
        "success" => {}
        "failed" | "error" => {
            return Err(ProviderError::protocol(
                PROVIDER_ID,
                format!("detector job ended with status '{}'", response.job_infos.job_status),
            ))
        }
        _ => {
            return Ok(FetchStatus::Pending {
                backend_status: response.job_infos.job_status,
            })
        }
    }

    let result = response
        .job_infos
        .report_info
        .and_then(|info| info.report.result_list.into_iter().next())
        .ok_or_else(|| ProviderError::protocol(PROVIDER_ID, "successful job has an empty resultList"))?;

    let confidence = unit_score(PROVIDER_ID, "confidence", result.confidence / 100.0)?;
    let ai_probability = orient(Verdict::from_is_ai(result.is_ai), confidence);

    let labels = result
        .suspected_model
        .filter(|model| !model.is_empty())
        .map(|model| {
            vec![LabelScore {
                name: model,
                score: confidence,
            }]
        })
        .unwrap_or_default();

    Ok(FetchStatus::Completed(
        DetectionOutcome::new(PROVIDER_ID, ai_probability, raw)
            .with_confidence(confidence)
            .with_labels(labels),
    ))
}
