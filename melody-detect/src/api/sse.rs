//! Server-Sent Events for detection progress
//!
//! Push variant of `GET /api/detections/:request_id`: a `Snapshot` event with
//! the current aggregate, then every `DetectionEvent` for that request until
//! it concludes or is abandoned.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::detect::DetectionView;
use crate::error::ApiResult;
use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn json_event<T: serde::Serialize>(name: &str, value: &T) -> Option<Event> {
    match serde_json::to_string(value) {
        Ok(data) => Some(Event::default().event(name).data(data)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", name, e);
            None
        }
    }
}

/// GET /api/detections/:request_id/events
pub async fn detection_event_stream(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before the snapshot so no transition falls in between
    let mut rx = state.event_bus.subscribe();
    let snapshot = state.orchestrator.aggregate(request_id).await?;

    info!(request_id = %request_id, "SSE client connected to detection events");

    let stream = async_stream::stream! {
        if let Some(event) = json_event("Snapshot", &DetectionView::from(&snapshot)) {
            yield Ok(event);
        }
        let mut open = !snapshot.complete;
        if !open {
            debug!(request_id = %request_id, "SSE: Request already complete");
        }

        while open {
            match rx.recv().await {
                Ok(event) if event.request_id() == request_id => {
                    if let Some(sse_event) = json_event(event.event_type(), &event) {
                        yield Ok(sse_event);
                    }
                    if event.is_final() {
                        debug!(request_id = %request_id, "SSE: Final event sent, closing stream");
                        open = false;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(request_id = %request_id, skipped, "SSE: Subscriber lagged");
                }
                Err(RecvError::Closed) => open = false,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    ))
}
