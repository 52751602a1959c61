//! Poll scheduler
//!
//! One tokio task per ENQUEUED job. The task fetches immediately, then waits
//! the provider's interval between attempts, until the tracker reports a
//! terminal state. Cancellation is only observed between attempts: a fetch
//! already in flight runs to completion and its result is dropped.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::job_tracker::{JobTracker, TrackerError};
use crate::providers::ProviderAdapter;

#[derive(Clone)]
pub struct PollScheduler {
    tracker: Arc<JobTracker>,
}

impl PollScheduler {
    pub fn new(tracker: Arc<JobTracker>) -> Self {
        Self { tracker }
    }

    /// Start polling one job
    ///
    /// `cancel` should be a child of the request's token so that abandoning
    /// the request stops this loop without affecting other requests.
    pub fn spawn(
        &self,
        request_id: Uuid,
        adapter: Arc<dyn ProviderAdapter>,
        external_job_id: String,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            poll_job(tracker, request_id, adapter, external_job_id, cancel).await;
        })
    }
}

async fn poll_job(
    tracker: Arc<JobTracker>,
    request_id: Uuid,
    adapter: Arc<dyn ProviderAdapter>,
    external_job_id: String,
    cancel: CancellationToken,
) {
    let provider = adapter.id();
    let policy = adapter.poll_policy();

    tracing::debug!(
        request_id = %request_id,
        provider,
        external_job_id = %external_job_id,
        interval_ms = policy.interval.as_millis() as u64,
        max_attempts = policy.max_attempts,
        "Polling started"
    );

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(request_id = %request_id, provider, "Polling cancelled");
            return;
        }

        let result = adapter.fetch(&external_job_id).await;

        if cancel.is_cancelled() {
            tracing::debug!(request_id = %request_id, provider, "Discarding fetch result of cancelled job");
            return;
        }

        match tracker
            .record_fetch(request_id, provider, result, policy.max_attempts)
            .await
        {
            Ok(job) if job.is_terminal() => return,
            Ok(_) => {}
            Err(TrackerError::RequestNotFound(_)) => {
                tracing::debug!(request_id = %request_id, provider, "Request gone, polling stopped");
                return;
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, provider, error = %e, "Polling stopped");
                return;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(request_id = %request_id, provider, "Polling cancelled");
                return;
            }
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}
