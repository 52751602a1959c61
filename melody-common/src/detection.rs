//! Detection vocabulary shared between the orchestrator and its observers
//!
//! Job states, reconciled conclusions and failure kinds travel inside
//! [`crate::events::DetectionEvent`] as well as HTTP responses, so they live
//! here rather than in the service crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one provider job
///
/// SUBMITTING → ENQUEUED → POLLING → FINISHED | FAILED.
/// Synchronous providers go straight from SUBMITTING to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Submission call in flight
    Submitting,
    /// Provider accepted the job, no result fetched yet
    Enqueued,
    /// At least one fetch returned "still pending"
    Polling,
    /// Terminal: outcome recorded
    Finished,
    /// Terminal: error recorded
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }

    /// Coarse status used by the canonical outcome schema
    pub fn status_label(self) -> &'static str {
        match self {
            JobState::Finished => "done",
            JobState::Failed => "failed",
            JobState::Submitting | JobState::Enqueued | JobState::Polling => "pending",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Submitting => "SUBMITTING",
            JobState::Enqueued => "ENQUEUED",
            JobState::Polling => "POLLING",
            JobState::Finished => "FINISHED",
            JobState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Reconciled verdict across all finished providers of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Conclusion {
    Human,
    Ai,
    Conflicting,
    InsufficientData,
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Conclusion::Human => "HUMAN",
            Conclusion::Ai => "AI",
            Conclusion::Conflicting => "CONFLICTING",
            Conclusion::InsufficientData => "INSUFFICIENT_DATA",
        };
        f.write_str(name)
    }
}

/// Category of a recorded job failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network, DNS or client timeout
    Transport,
    /// Non-2xx response or malformed body
    Protocol,
    /// Credential rejected (after the single refresh-and-retry)
    Auth,
    /// Attempt ceiling exceeded while polling
    Timeout,
}
