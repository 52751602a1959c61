//! Data models for detection requests, provider jobs and outcomes

pub mod aggregate;
pub mod job;
pub mod outcome;
pub mod request;

pub use aggregate::AggregateResult;
pub use job::{InvalidTransition, JobFailure, ProviderJob};
pub use outcome::{CanonicalResult, DetectionOutcome, LabelScore, AI_THRESHOLD};
pub use request::DetectionRequest;
