//! Scripted provider adapters for orchestrator and HTTP tests

#![allow(dead_code)]

use async_trait::async_trait;
use melody_common::events::EventBus;
use melody_detect::models::{DetectionOutcome, DetectionRequest};
use melody_detect::providers::{
    FetchStatus, PollPolicy, ProviderAdapter, ProviderError, ProviderMode, ProviderRegistry, Submission,
};
use melody_detect::services::DetectionOrchestrator;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn outcome(provider: &str, p: f64) -> DetectionOutcome {
    DetectionOutcome::new(provider, p, json!({"provider": provider, "score": p}))
}

pub fn request() -> DetectionRequest {
    DetectionRequest::new("track.mp3", vec![0u8; 128]).unwrap()
}

pub fn dyn_adapter<A: ProviderAdapter + 'static>(adapter: Arc<A>) -> Arc<dyn ProviderAdapter> {
    adapter
}

pub fn registry(adapters: Vec<Arc<dyn ProviderAdapter>>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    registry
}

pub fn orchestrator(adapters: Vec<Arc<dyn ProviderAdapter>>) -> (Arc<DetectionOrchestrator>, EventBus) {
    let bus = EventBus::new(256);
    let orchestrator = Arc::new(DetectionOrchestrator::new(registry(adapters), bus.clone()));
    (orchestrator, bus)
}

/// Synchronous provider with a fixed answer
pub struct InstantProvider {
    pub id: &'static str,
    pub probability: f64,
}

impl InstantProvider {
    pub fn new(id: &'static str, probability: f64) -> Arc<Self> {
        Arc::new(Self { id, probability })
    }
}

#[async_trait]
impl ProviderAdapter for InstantProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn submit(&self, _request: &DetectionRequest) -> Result<Submission, ProviderError> {
        Ok(Submission::Completed(outcome(self.id, self.probability)))
    }
}

/// Synchronous provider whose submission always fails
pub struct BrokenProvider {
    pub id: &'static str,
}

#[async_trait]
impl ProviderAdapter for BrokenProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn submit(&self, _request: &DetectionRequest) -> Result<Submission, ProviderError> {
        Err(ProviderError::transport(self.id, "connection refused"))
    }
}

/// Polling provider replaying a fixed script of fetch results
///
/// Once the script is exhausted every fetch reports "processing".
pub struct ScriptedPoller {
    pub id: &'static str,
    policy: PollPolicy,
    script: Mutex<VecDeque<Result<FetchStatus, ProviderError>>>,
    fetches: AtomicU32,
}

impl ScriptedPoller {
    pub fn new(
        id: &'static str,
        interval: Duration,
        max_attempts: u32,
        script: Vec<Result<FetchStatus, ProviderError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            policy: PollPolicy {
                interval,
                max_attempts,
            },
            script: Mutex::new(script.into()),
            fetches: AtomicU32::new(0),
        })
    }

    /// Poller that never finishes
    pub fn stuck(id: &'static str, interval: Duration, max_attempts: u32) -> Arc<Self> {
        Self::new(id, interval, max_attempts, Vec::new())
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

pub fn pending() -> Result<FetchStatus, ProviderError> {
    Ok(FetchStatus::Pending {
        backend_status: "processing".to_string(),
    })
}

#[async_trait]
impl ProviderAdapter for ScriptedPoller {
    fn id(&self) -> &'static str {
        self.id
    }

    fn mode(&self) -> ProviderMode {
        ProviderMode::Polling
    }

    fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    async fn submit(&self, _request: &DetectionRequest) -> Result<Submission, ProviderError> {
        Ok(Submission::Enqueued {
            external_job_id: format!("{}-job", self.id),
        })
    }

    async fn fetch(&self, external_job_id: &str) -> Result<FetchStatus, ProviderError> {
        assert_eq!(external_job_id, format!("{}-job", self.id));
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().pop_front().unwrap_or_else(pending)
    }
}

/// Wait (in paused tokio time) until the request's jobs are all terminal
pub async fn wait_until_complete(orchestrator: &DetectionOrchestrator, request_id: uuid::Uuid) {
    for _ in 0..600 {
        if orchestrator.aggregate(request_id).await.unwrap().complete {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("request {} did not complete", request_id);
}
