//! Provider adapters
//!
//! One adapter per third-party detector. Each translates a
//! [`DetectionRequest`] into that provider's submission protocol and its raw
//! response into a canonical [`DetectionOutcome`].
//!
//! | Adapter | Mode |
//! |---------|------|
//! | `aiornot` | synchronous |
//! | `hive` | synchronous |
//! | `shlabs` | synchronous |
//! | `sightengine` | synchronous |
//! | `ircam` | OAuth-gated polling |

pub mod aiornot;
mod error;
pub mod hive;
pub mod http;
pub mod ircam;
pub mod normalize;
pub mod shlabs;
pub mod sightengine;

pub use error::ProviderError;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{DetectionOutcome, DetectionRequest};

/// Default wait between two fetches of the same job
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Default attempt ceiling for polling providers
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// How a provider delivers its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// `submit` returns the terminal outcome
    Synchronous,
    /// `submit` returns a job id; `fetch` is polled until terminal
    Polling,
}

/// Poll cadence for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollPolicy {
    #[serde(rename = "interval_ms", serialize_with = "serialize_millis")]
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Result of a submission call
#[derive(Debug, Clone)]
pub enum Submission {
    /// Synchronous provider answered inline
    Completed(DetectionOutcome),
    /// Polling provider accepted the job
    Enqueued { external_job_id: String },
}

/// Result of one fetch call
#[derive(Debug, Clone)]
pub enum FetchStatus {
    /// Backend is still working; `backend_status` is its raw status text
    Pending { backend_status: String },
    /// Terminal backend status observed
    Completed(DetectionOutcome),
}

/// Contract every provider adapter implements
///
/// `fetch` must be idempotent: the poll scheduler calls it repeatedly with the
/// same id until it yields a terminal result or an error.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider id used in job records and API paths
    fn id(&self) -> &'static str;

    fn mode(&self) -> ProviderMode {
        ProviderMode::Synchronous
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::default()
    }

    async fn submit(&self, request: &DetectionRequest) -> Result<Submission, ProviderError>;

    async fn fetch(&self, external_job_id: &str) -> Result<FetchStatus, ProviderError> {
        Err(ProviderError::protocol(
            self.id(),
            format!("result polling not supported (job {})", external_job_id),
        ))
    }
}

/// Summary of one registered provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub mode: ProviderMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_policy: Option<PollPolicy>,
}

/// Set of configured adapters, keyed by provider id
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter, replacing any previous one with the same id
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        tracing::info!(provider = adapter.id(), mode = ?adapter.mode(), "Provider registered");
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn describe(&self) -> Vec<ProviderInfo> {
        self.adapters
            .values()
            .map(|adapter| ProviderInfo {
                id: adapter.id(),
                mode: adapter.mode(),
                poll_policy: (adapter.mode() == ProviderMode::Polling)
                    .then(|| adapter.poll_policy()),
            })
            .collect()
    }
}
