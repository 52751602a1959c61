//! Provider job state machine
//!
//! SUBMITTING → ENQUEUED → POLLING → FINISHED | FAILED, with synchronous
//! providers jumping straight from SUBMITTING to a terminal state.
//!
//! Fields are private: every mutation goes through a transition method, so
//! `outcome` is set exactly when the state is FINISHED and `error` exactly when
//! it is FAILED.

use chrono::{DateTime, Utc};
use melody_common::{FailureKind, JobState};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::outcome::DetectionOutcome;
use crate::providers::ProviderError;

/// Recorded cause of a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub cause: String,
}

impl From<&ProviderError> for JobFailure {
    fn from(err: &ProviderError) -> Self {
        Self {
            kind: err.kind(),
            cause: err.to_string(),
        }
    }
}

/// Attempted transition not allowed from the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// One submitted job for one provider within one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderJob {
    job_id: Uuid,
    provider_id: String,
    external_job_id: Option<String>,
    state: JobState,
    attempts: u32,
    created_at: DateTime<Utc>,
    last_polled_at: Option<DateTime<Utc>>,
    outcome: Option<DetectionOutcome>,
    error: Option<JobFailure>,
}

impl ProviderJob {
    /// New job in SUBMITTING
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            provider_id: provider_id.into(),
            external_job_id: None,
            state: JobState::Submitting,
            attempts: 0,
            created_at: Utc::now(),
            last_polled_at: None,
            outcome: None,
            error: None,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn external_job_id(&self) -> Option<&str> {
        self.external_job_id.as_deref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_polled_at(&self) -> Option<DateTime<Utc>> {
        self.last_polled_at
    }

    pub fn outcome(&self) -> Option<&DetectionOutcome> {
        self.outcome.as_ref()
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    // ------------------------------------------------------------------
    // Submission path
    // ------------------------------------------------------------------

    /// SUBMITTING → FINISHED (synchronous provider)
    pub fn complete(&mut self, outcome: DetectionOutcome) -> Result<(), InvalidTransition> {
        self.ensure(&[JobState::Submitting], JobState::Finished)?;
        self.set_finished(outcome);
        Ok(())
    }

    /// SUBMITTING → ENQUEUED (polling provider accepted the job)
    pub fn enqueue(&mut self, external_job_id: impl Into<String>) -> Result<(), InvalidTransition> {
        self.ensure(&[JobState::Submitting], JobState::Enqueued)?;
        self.external_job_id = Some(external_job_id.into());
        self.state = JobState::Enqueued;
        Ok(())
    }

    /// Any non-terminal state → FAILED
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), InvalidTransition> {
        self.ensure(
            &[JobState::Submitting, JobState::Enqueued, JobState::Polling],
            JobState::Failed,
        )?;
        self.set_failed(failure);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Polling path (each call counts one fetch attempt)
    // ------------------------------------------------------------------

    /// Fetch returned "still pending"
    ///
    /// Moves to POLLING, or to FAILED(timeout) once `max_attempts` fetches have
    /// all come back pending.
    pub fn poll_pending(&mut self, max_attempts: u32) -> Result<(), InvalidTransition> {
        self.ensure(&[JobState::Enqueued, JobState::Polling], JobState::Polling)?;
        self.count_attempt();

        if self.attempts >= max_attempts {
            let timeout = ProviderError::Timeout {
                provider: self.provider_id.clone(),
                attempts: self.attempts,
            };
            self.set_failed(JobFailure::from(&timeout));
        } else {
            self.state = JobState::Polling;
        }
        Ok(())
    }

    /// Fetch returned a terminal outcome
    pub fn poll_finished(&mut self, outcome: DetectionOutcome) -> Result<(), InvalidTransition> {
        self.ensure(&[JobState::Enqueued, JobState::Polling], JobState::Finished)?;
        self.count_attempt();
        self.set_finished(outcome);
        Ok(())
    }

    /// Fetch raised a provider error; polling stops
    pub fn poll_failed(&mut self, failure: JobFailure) -> Result<(), InvalidTransition> {
        self.ensure(&[JobState::Enqueued, JobState::Polling], JobState::Failed)?;
        self.count_attempt();
        self.set_failed(failure);
        Ok(())
    }

    fn ensure(&self, allowed: &[JobState], to: JobState) -> Result<(), InvalidTransition> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    fn count_attempt(&mut self) {
        self.attempts += 1;
        self.last_polled_at = Some(Utc::now());
    }

    fn set_finished(&mut self, outcome: DetectionOutcome) {
        self.state = JobState::Finished;
        self.outcome = Some(outcome);
        self.error = None;
    }

    fn set_failed(&mut self, failure: JobFailure) {
        self.state = JobState::Failed;
        self.error = Some(failure);
        self.outcome = None;
    }
}
