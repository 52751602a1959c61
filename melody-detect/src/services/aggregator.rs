//! Result aggregation
//!
//! Reconciles the finished jobs of one request into a single conclusion.
//! FAILED jobs are carried in the view but never vote. Safe to evaluate at
//! any point, including before every job is terminal.

use melody_common::Conclusion;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{AggregateResult, ProviderJob};

/// Conclusion over the jobs' current outcomes
///
/// - no FINISHED job → INSUFFICIENT_DATA
/// - every FINISHED job above 0.5 → AI
/// - every FINISHED job at or below 0.5 → HUMAN
/// - otherwise → CONFLICTING
pub fn conclude<'a>(jobs: impl IntoIterator<Item = &'a ProviderJob>) -> Conclusion {
    let mut ai_votes = 0usize;
    let mut human_votes = 0usize;

    for outcome in jobs.into_iter().filter_map(ProviderJob::outcome) {
        if outcome.says_ai() {
            ai_votes += 1;
        } else {
            human_votes += 1;
        }
    }

    match (ai_votes, human_votes) {
        (0, 0) => Conclusion::InsufficientData,
        (_, 0) => Conclusion::Ai,
        (0, _) => Conclusion::Human,
        _ => Conclusion::Conflicting,
    }
}

/// Build the live aggregate view for one request
pub fn aggregate(request_id: Uuid, per_provider: BTreeMap<String, ProviderJob>) -> AggregateResult {
    let conclusion = conclude(per_provider.values());
    let complete = per_provider.values().all(|job| job.state().is_terminal());

    AggregateResult {
        request_id,
        conclusion,
        complete,
        per_provider,
    }
}
