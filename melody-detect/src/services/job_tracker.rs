//! Job tracker
//!
//! Single source of truth for every [`ProviderJob`] of every live request.
//! Each transition is applied under the write lock and published on the
//! [`EventBus`]; once the last job of a request turns terminal a
//! `DetectionConcluded` event follows.
//!
//! Records are short-lived: a request disappears when it is abandoned or
//! evicted by the retention sweeper, after which every lookup is NotFound.

use chrono::Utc;
use melody_common::events::{DetectionEvent, EventBus};
use melody_common::JobState;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::aggregator;
use crate::models::{AggregateResult, InvalidTransition, JobFailure, ProviderJob};
use crate::providers::{FetchStatus, ProviderError, Submission};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("job not found: {provider}/{job_id}")]
    JobNotFound { provider: String, job_id: String },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

struct RequestRecord {
    created_at: Instant,
    jobs: BTreeMap<String, ProviderJob>,
    cancel: CancellationToken,
    concluded: bool,
}

#[derive(Default)]
struct TrackerState {
    requests: HashMap<Uuid, RequestRecord>,
    /// job_id → request_id
    job_index: HashMap<Uuid, Uuid>,
}

impl TrackerState {
    fn remove(&mut self, request_id: Uuid) -> Option<RequestRecord> {
        let record = self.requests.remove(&request_id)?;
        for job in record.jobs.values() {
            self.job_index.remove(&job.job_id());
        }
        record.cancel.cancel();
        Some(record)
    }
}

/// Handle returned when a request is opened
#[derive(Debug, Clone)]
pub struct OpenedRequest {
    pub request_id: Uuid,
    /// Cancelled when the request is abandoned or evicted
    pub cancel: CancellationToken,
}

pub struct JobTracker {
    state: RwLock<TrackerState>,
    event_bus: EventBus,
}

impl JobTracker {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            state: RwLock::new(TrackerState::default()),
            event_bus,
        }
    }

    /// Create one SUBMITTING job per provider under a fresh request id
    pub async fn open_request(&self, filename: &str, providers: &[&str]) -> OpenedRequest {
        let request_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let jobs: BTreeMap<String, ProviderJob> = providers
            .iter()
            .map(|provider| (provider.to_string(), ProviderJob::new(*provider)))
            .collect();

        {
            let mut state = self.state.write().await;
            for job in jobs.values() {
                state.job_index.insert(job.job_id(), request_id);
            }
            state.requests.insert(
                request_id,
                RequestRecord {
                    created_at: Instant::now(),
                    jobs,
                    cancel: cancel.clone(),
                    concluded: false,
                },
            );
        }

        tracing::info!(
            request_id = %request_id,
            filename = %filename,
            providers = ?providers,
            "Detection request opened"
        );

        self.event_bus.emit_lossy(DetectionEvent::DetectionStarted {
            request_id,
            filename: filename.to_string(),
            providers: providers.iter().map(|p| p.to_string()).collect(),
            timestamp: Utc::now(),
        });

        OpenedRequest { request_id, cancel }
    }

    /// Apply the result of a `submit` call
    pub async fn record_submission(
        &self,
        request_id: Uuid,
        provider: &str,
        result: Result<Submission, ProviderError>,
    ) -> Result<ProviderJob, TrackerError> {
        self.transition(request_id, provider, |job| match result {
            Ok(Submission::Completed(outcome)) => job.complete(outcome),
            Ok(Submission::Enqueued { external_job_id }) => job.enqueue(external_job_id),
            Err(err) => {
                tracing::warn!(request_id = %request_id, provider, error = %err, "Submission failed");
                job.fail(JobFailure::from(&err))
            }
        })
        .await
    }

    /// Apply the result of one `fetch` attempt
    ///
    /// A pending result at `max_attempts` turns the job FAILED (timeout).
    pub async fn record_fetch(
        &self,
        request_id: Uuid,
        provider: &str,
        result: Result<FetchStatus, ProviderError>,
        max_attempts: u32,
    ) -> Result<ProviderJob, TrackerError> {
        self.transition(request_id, provider, |job| match result {
            Ok(FetchStatus::Pending { backend_status }) => {
                tracing::debug!(
                    request_id = %request_id,
                    provider,
                    attempt = job.attempts() + 1,
                    backend_status = %backend_status,
                    "Job still pending"
                );
                job.poll_pending(max_attempts)
            }
            Ok(FetchStatus::Completed(outcome)) => job.poll_finished(outcome),
            Err(err) => {
                tracing::warn!(request_id = %request_id, provider, error = %err, "Fetch failed");
                job.poll_failed(JobFailure::from(&err))
            }
        })
        .await
    }

    async fn transition<F>(
        &self,
        request_id: Uuid,
        provider: &str,
        apply: F,
    ) -> Result<ProviderJob, TrackerError>
    where
        F: FnOnce(&mut ProviderJob) -> Result<(), InvalidTransition>,
    {
        let mut state = self.state.write().await;
        let record = state
            .requests
            .get_mut(&request_id)
            .ok_or(TrackerError::RequestNotFound(request_id))?;

        let job = record
            .jobs
            .get_mut(provider)
            .ok_or_else(|| TrackerError::JobNotFound {
                provider: provider.to_string(),
                job_id: request_id.to_string(),
            })?;

        apply(job)?;
        let job = job.clone();

        self.event_bus.emit_lossy(DetectionEvent::ProviderJobUpdated {
            request_id,
            provider: provider.to_string(),
            job_id: job.job_id(),
            state: job.state(),
            attempts: job.attempts(),
            ai_probability: job.outcome().map(|o| o.ai_probability),
            error: job.error().map(|e| e.cause.clone()),
            timestamp: Utc::now(),
        });

        if job.is_terminal() {
            tracing::info!(
                request_id = %request_id,
                provider,
                job_id = %job.job_id(),
                state = %job.state(),
                attempts = job.attempts(),
                "Job reached terminal state"
            );
        }

        let all_terminal = record.jobs.values().all(ProviderJob::is_terminal);
        if all_terminal && !record.concluded {
            record.concluded = true;
            let conclusion = aggregator::conclude(record.jobs.values());
            tracing::info!(request_id = %request_id, conclusion = %conclusion, "Detection concluded");
            self.event_bus.emit_lossy(DetectionEvent::DetectionConcluded {
                request_id,
                conclusion,
                timestamp: Utc::now(),
            });
        }

        Ok(job)
    }

    /// Look up a job by provider id and job id (idempotent read)
    pub async fn job(&self, provider: &str, job_id: &str) -> Result<ProviderJob, TrackerError> {
        let not_found = || TrackerError::JobNotFound {
            provider: provider.to_string(),
            job_id: job_id.to_string(),
        };

        let job_uuid = Uuid::parse_str(job_id).map_err(|_| not_found())?;

        let state = self.state.read().await;
        let request_id = state.job_index.get(&job_uuid).ok_or_else(not_found)?;

        state
            .requests
            .get(request_id)
            .and_then(|record| record.jobs.get(provider))
            .filter(|job| job.job_id() == job_uuid)
            .cloned()
            .ok_or_else(not_found)
    }

    /// Current state of every job of a request
    pub async fn jobs(&self, request_id: Uuid) -> Result<BTreeMap<String, ProviderJob>, TrackerError> {
        let state = self.state.read().await;
        state
            .requests
            .get(&request_id)
            .map(|record| record.jobs.clone())
            .ok_or(TrackerError::RequestNotFound(request_id))
    }

    /// Live aggregate view of a request
    pub async fn aggregate(&self, request_id: Uuid) -> Result<AggregateResult, TrackerError> {
        let jobs = self.jobs(request_id).await?;
        Ok(aggregator::aggregate(request_id, jobs))
    }

    /// Stop polling and drop the request's records
    pub async fn abandon(&self, request_id: Uuid) -> Result<(), TrackerError> {
        let removed = self.state.write().await.remove(request_id);
        if removed.is_none() {
            return Err(TrackerError::RequestNotFound(request_id));
        }

        tracing::info!(request_id = %request_id, "Detection request abandoned");
        self.event_bus.emit_lossy(DetectionEvent::DetectionAbandoned {
            request_id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Evict requests opened more than `max_age` ago; returns how many were removed
    pub async fn evict_older_than(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut state = self.state.write().await;

        let expired: Vec<Uuid> = state
            .requests
            .iter()
            .filter(|(_, record)| now.duration_since(record.created_at) >= max_age)
            .map(|(id, _)| *id)
            .collect();

        for request_id in &expired {
            if let Some(record) = state.remove(*request_id) {
                let unfinished = record.jobs.values().filter(|j| !j.is_terminal()).count();
                tracing::debug!(request_id = %request_id, unfinished, "Evicting expired request");
            }
            self.event_bus.emit_lossy(DetectionEvent::DetectionAbandoned {
                request_id: *request_id,
                timestamp: Utc::now(),
            });
        }

        expired.len()
    }

    /// Number of live requests
    pub async fn request_count(&self) -> usize {
        self.state.read().await.requests.len()
    }

    /// Jobs across all live requests, per state
    pub async fn job_counts(&self) -> HashMap<JobState, usize> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for job in state.requests.values().flat_map(|r| r.jobs.values()) {
            *counts.entry(job.state()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetectionOutcome;
    use melody_common::{Conclusion, FailureKind};
    use serde_json::json;

    fn tracker() -> (JobTracker, EventBus) {
        let bus = EventBus::new(64);
        (JobTracker::new(bus.clone()), bus)
    }

    fn completed(provider: &str, p: f64) -> Result<Submission, ProviderError> {
        Ok(Submission::Completed(DetectionOutcome::new(provider, p, json!({}))))
    }

    #[tokio::test]
    async fn test_submission_paths() {
        let (tracker, _bus) = tracker();
        let opened = tracker.open_request("song.mp3", &["a", "b", "c"]).await;
        let id = opened.request_id;

        let a = tracker.record_submission(id, "a", completed("a", 0.7)).await.unwrap();
        assert_eq!(a.state(), JobState::Finished);

        let b = tracker
            .record_submission(
                id,
                "b",
                Ok(Submission::Enqueued {
                    external_job_id: "ext-b".into(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(b.state(), JobState::Enqueued);

        let c = tracker
            .record_submission(id, "c", Err(ProviderError::transport("c", "refused")))
            .await
            .unwrap();
        assert_eq!(c.state(), JobState::Failed);
        assert_eq!(c.error().unwrap().kind, FailureKind::Transport);

        let view = tracker.aggregate(id).await.unwrap();
        assert!(!view.complete);
        assert_eq!(view.conclusion, Conclusion::Ai);
    }

    #[tokio::test]
    async fn test_concluded_event_emitted_once() {
        let (tracker, bus) = tracker();
        let mut rx = bus.subscribe();

        let id = tracker.open_request("x.wav", &["a", "b"]).await.request_id;
        tracker.record_submission(id, "a", completed("a", 0.9)).await.unwrap();
        tracker.record_submission(id, "b", completed("b", 0.2)).await.unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DetectionEvent::DetectionConcluded { conclusion, .. } = &event {
                assert_eq!(*conclusion, Conclusion::Conflicting);
            }
            types.push(event.event_type().to_string());
        }
        assert_eq!(
            types,
            vec![
                "DetectionStarted",
                "ProviderJobUpdated",
                "ProviderJobUpdated",
                "DetectionConcluded"
            ]
        );
    }

    #[tokio::test]
    async fn test_job_lookup() {
        let (tracker, _bus) = tracker();
        let id = tracker.open_request("x.wav", &["a"]).await.request_id;
        let job = tracker.record_submission(id, "a", completed("a", 0.3)).await.unwrap();
        let job_id = job.job_id().to_string();

        let first = tracker.job("a", &job_id).await.unwrap();
        let second = tracker.job("a", &job_id).await.unwrap();
        assert_eq!(first, second);

        assert!(matches!(
            tracker.job("b", &job_id).await,
            Err(TrackerError::JobNotFound { .. })
        ));
        assert!(tracker.job("a", "not-a-uuid").await.is_err());
        assert!(tracker.job("a", &Uuid::new_v4().to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_transition_reported() {
        let (tracker, _bus) = tracker();
        let id = tracker.open_request("x.wav", &["a"]).await.request_id;
        tracker.record_submission(id, "a", completed("a", 0.3)).await.unwrap();

        let err = tracker
            .record_fetch(id, "a", Ok(FetchStatus::Pending { backend_status: "x".into() }), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_abandon_cancels_and_forgets() {
        let (tracker, _bus) = tracker();
        let opened = tracker.open_request("x.wav", &["a"]).await;
        let job = tracker
            .record_submission(
                opened.request_id,
                "a",
                Ok(Submission::Enqueued {
                    external_job_id: "ext".into(),
                }),
            )
            .await
            .unwrap();

        tracker.abandon(opened.request_id).await.unwrap();
        assert!(opened.cancel.is_cancelled());
        assert!(tracker.aggregate(opened.request_id).await.is_err());
        assert!(tracker.job("a", &job.job_id().to_string()).await.is_err());

        // Late fetch result is rejected
        let late = tracker
            .record_fetch(opened.request_id, "a", Ok(FetchStatus::Pending { backend_status: "x".into() }), 5)
            .await;
        assert!(matches!(late, Err(TrackerError::RequestNotFound(_))));

        assert!(tracker.abandon(opened.request_id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_by_age() {
        let (tracker, _bus) = tracker();
        let old = tracker.open_request("old.wav", &["a"]).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        let fresh = tracker.open_request("new.wav", &["a"]).await;

        tokio::time::advance(Duration::from_secs(40)).await;
        let evicted = tracker.evict_older_than(Duration::from_secs(60)).await;

        assert_eq!(evicted, 1);
        assert!(old.cancel.is_cancelled());
        assert!(!fresh.cancel.is_cancelled());
        assert_eq!(tracker.request_count().await, 1);
        assert_eq!(tracker.job_counts().await.get(&JobState::Submitting), Some(&1));
    }
}
