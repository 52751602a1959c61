//! Reconciled view over all jobs of one request

use melody_common::Conclusion;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::job::ProviderJob;

/// Live aggregate for one request
///
/// Derived on demand from the tracker's jobs; never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub request_id: Uuid,
    pub conclusion: Conclusion,
    /// True once every job is FINISHED or FAILED
    pub complete: bool,
    pub per_provider: BTreeMap<String, ProviderJob>,
}
