//! Per-job result retrieval

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use melody_common::JobState;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{CanonicalResult, JobFailure, LabelScore, ProviderJob};
use crate::AppState;

/// Canonical result plus job bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub result: CanonicalResult,
    pub state: JobState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub label_details: Vec<LabelScore>,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub error: Option<JobFailure>,
}

impl From<&ProviderJob> for JobView {
    fn from(job: &ProviderJob) -> Self {
        Self {
            job_id: job.job_id(),
            result: CanonicalResult::from(job),
            state: job.state(),
            attempts: job.attempts(),
            external_job_id: job.external_job_id().map(str::to_string),
            label_details: job
                .outcome()
                .map(|o| o.label_details.clone())
                .unwrap_or_default(),
            created_at: job.created_at(),
            last_polled_at: job.last_polled_at(),
            error: job.error().cloned(),
        }
    }
}

/// GET /api/results/:provider/:job_id
pub async fn get_result(
    State(state): State<AppState>,
    Path((provider, job_id)): Path<(String, String)>,
) -> ApiResult<Json<JobView>> {
    let job = state.orchestrator.job(&provider, &job_id).await?;
    Ok(Json(JobView::from(&job)))
}

pub fn result_routes() -> Router<AppState> {
    Router::new().route("/api/results/:provider/:job_id", get(get_result))
}
