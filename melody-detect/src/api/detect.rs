//! Detection submission and request-level views

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use melody_common::Conclusion;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::results::JobView;
use super::sse::detection_event_stream;
use crate::error::{ApiError, ApiResult};
use crate::models::{AggregateResult, DetectionRequest};
use crate::AppState;

/// Response to a submission
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub request_id: Uuid,
    pub jobs: BTreeMap<String, JobView>,
}

/// Live aggregate of one request
#[derive(Debug, Serialize)]
pub struct DetectionView {
    pub request_id: Uuid,
    pub conclusion: Conclusion,
    pub complete: bool,
    pub per_provider: BTreeMap<String, JobView>,
}

impl From<&AggregateResult> for DetectionView {
    fn from(aggregate: &AggregateResult) -> Self {
        Self {
            request_id: aggregate.request_id,
            conclusion: aggregate.conclusion,
            complete: aggregate.complete,
            per_provider: aggregate
                .per_provider
                .iter()
                .map(|(id, job)| (id.clone(), JobView::from(job)))
                .collect(),
        }
    }
}

/// POST /api/detections
///
/// Multipart body: one `file` part plus zero or more `provider` parts (each
/// may hold a comma-separated list). No `provider` part selects every
/// configured provider.
pub async fn submit_detection(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut upload: Option<(String, bytes::Bytes)> = None;
    let mut providers: Vec<String> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content = field.bytes().await?;
                upload = Some((filename, content));
            }
            Some("provider") | Some("providers") => {
                let text = field.text().await?;
                providers.extend(
                    text.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string),
                );
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unexpected multipart field");
            }
        }
    }

    let (filename, content) =
        upload.ok_or_else(|| ApiError::BadRequest("multipart field 'file' is required".to_string()))?;
    let request = DetectionRequest::new(filename, content)?;

    let receipt = state.orchestrator.submit(request, &providers).await?;

    let jobs = receipt
        .jobs
        .iter()
        .map(|(id, job)| (id.clone(), JobView::from(job)))
        .collect();

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            request_id: receipt.request_id,
            jobs,
        }),
    ))
}

/// GET /api/detections/:request_id
pub async fn get_detection(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<DetectionView>> {
    let aggregate = state.orchestrator.aggregate(request_id).await?;
    Ok(Json(DetectionView::from(&aggregate)))
}

/// DELETE /api/detections/:request_id
pub async fn abandon_detection(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.orchestrator.abandon(request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn detection_routes() -> Router<AppState> {
    Router::new()
        .route("/api/detections", axum::routing::post(submit_detection))
        .route(
            "/api/detections/:request_id",
            get(get_detection).delete(abandon_detection),
        )
        .route("/api/detections/:request_id/events", get(detection_event_stream))
}
