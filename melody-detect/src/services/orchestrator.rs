//! Detection orchestrator
//!
//! Fans one upload out to the selected providers, records each submission
//! with the [`JobTracker`] and hands accepted polling jobs to the
//! [`PollScheduler`]. Provider failures never escape this boundary: they end
//! up as FAILED jobs.

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::job_tracker::{JobTracker, TrackerError};
use super::poll_scheduler::PollScheduler;
use crate::models::{AggregateResult, DetectionRequest, ProviderJob};
use crate::providers::{ProviderAdapter, ProviderRegistry, Submission};
use melody_common::events::EventBus;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no detection providers are configured")]
    NoProviders,

    #[error("{0}")]
    NotFound(String),

    /// A job was asked to move somewhere its state machine forbids
    #[error("{0}")]
    Conflict(String),
}

impl From<TrackerError> for OrchestratorError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::RequestNotFound(_) | TrackerError::JobNotFound { .. } => {
                OrchestratorError::NotFound(err.to_string())
            }
            TrackerError::InvalidTransition(_) => OrchestratorError::Conflict(err.to_string()),
        }
    }
}

/// What the caller gets back from a submission
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub request_id: Uuid,
    /// Job view per provider right after submission: terminal for
    /// synchronous providers, ENQUEUED (with its job id) for polling ones
    pub jobs: BTreeMap<String, ProviderJob>,
}

pub struct DetectionOrchestrator {
    registry: ProviderRegistry,
    tracker: Arc<JobTracker>,
    scheduler: PollScheduler,
}

impl DetectionOrchestrator {
    pub fn new(registry: ProviderRegistry, event_bus: EventBus) -> Self {
        let tracker = Arc::new(JobTracker::new(event_bus));
        let scheduler = PollScheduler::new(tracker.clone());
        Self {
            registry,
            tracker,
            scheduler,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Resolve the requested provider ids; empty means every configured one
    fn select(&self, requested: &[String]) -> Result<Vec<Arc<dyn ProviderAdapter>>, OrchestratorError> {
        if self.registry.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }

        let ids: BTreeSet<&str> = if requested.is_empty() {
            self.registry.ids().into_iter().collect()
        } else {
            requested.iter().map(|id| id.trim()).collect()
        };

        ids.into_iter()
            .map(|id| {
                self.registry
                    .get(id)
                    .ok_or_else(|| OrchestratorError::UnknownProvider(id.to_string()))
            })
            .collect()
    }

    /// Submit `request` to the selected providers concurrently
    ///
    /// Returns once every submission call has answered. The request payload is
    /// released at that point; polling continues in the background.
    pub async fn submit(
        &self,
        request: DetectionRequest,
        providers: &[String],
    ) -> Result<SubmissionReceipt, OrchestratorError> {
        let adapters = self.select(providers)?;
        let ids: Vec<&str> = adapters.iter().map(|a| a.id()).collect();

        let opened = self.tracker.open_request(request.filename(), &ids).await;
        let request_id = opened.request_id;

        let submissions = adapters.iter().map(|adapter| {
            let request = &request;
            let cancel = &opened.cancel;
            async move {
                let provider = adapter.id();
                let result = adapter.submit(request).await;

                let external_job_id = match &result {
                    Ok(Submission::Enqueued { external_job_id }) => Some(external_job_id.clone()),
                    _ => None,
                };

                match self.tracker.record_submission(request_id, provider, result).await {
                    Ok(_) => {
                        if let Some(external_job_id) = external_job_id {
                            self.scheduler.spawn(
                                request_id,
                                adapter.clone(),
                                external_job_id,
                                cancel.child_token(),
                            );
                        }
                    }
                    Err(e) => {
                        tracing::debug!(
                            request_id = %request_id,
                            provider,
                            error = %e,
                            "Submission result discarded"
                        );
                    }
                }
            }
        });
        join_all(submissions).await;
        drop(request);

        let jobs = self.tracker.jobs(request_id).await?;
        Ok(SubmissionReceipt { request_id, jobs })
    }

    /// Live aggregate view of one request
    pub async fn aggregate(&self, request_id: Uuid) -> Result<AggregateResult, OrchestratorError> {
        Ok(self.tracker.aggregate(request_id).await?)
    }

    /// Current view of one job
    pub async fn job(&self, provider: &str, job_id: &str) -> Result<ProviderJob, OrchestratorError> {
        Ok(self.tracker.job(provider, job_id).await?)
    }

    /// Stop all polling for a request and forget it
    pub async fn abandon(&self, request_id: Uuid) -> Result<(), OrchestratorError> {
        Ok(self.tracker.abandon(request_id).await?)
    }

    /// Periodically evict requests older than `retention` until `shutdown` fires
    pub fn spawn_retention_sweeper(
        &self,
        retention: Duration,
        sweep_interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Retention sweeper stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let evicted = tracker.evict_older_than(retention).await;
                        if evicted > 0 {
                            tracing::info!(evicted, "Expired detection requests evicted");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvalidTransition;
    use melody_common::JobState;

    #[test]
    fn test_missing_records_map_to_not_found() {
        let err: OrchestratorError = TrackerError::RequestNotFound(Uuid::nil()).into();
        assert!(matches!(err, OrchestratorError::NotFound(_)));

        let err: OrchestratorError = TrackerError::JobNotFound {
            provider: "hive".to_string(),
            job_id: "j-1".to_string(),
        }
        .into();
        assert!(matches!(err, OrchestratorError::NotFound(ref msg) if msg.contains("hive")));
    }

    #[test]
    fn test_rejected_transition_is_a_conflict() {
        let err: OrchestratorError = TrackerError::InvalidTransition(InvalidTransition {
            from: JobState::Finished,
            to: JobState::Polling,
        })
        .into();
        assert!(matches!(err, OrchestratorError::Conflict(_)));
        assert!(err.to_string().contains("invalid job transition"));
    }
}
