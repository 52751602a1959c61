//! Orchestration services
//!
//! - [`token_cache`]: process-wide bearer credentials with single-flight refresh
//! - [`job_tracker`]: per-request job records and their transitions
//! - [`poll_scheduler`]: one polling task per asynchronous job
//! - [`aggregator`]: reconciles finished outcomes into one conclusion
//! - [`orchestrator`]: facade tying the above together

pub mod aggregator;
pub mod job_tracker;
pub mod orchestrator;
pub mod poll_scheduler;
pub mod token_cache;

pub use job_tracker::{JobTracker, OpenedRequest, TrackerError};
pub use orchestrator::{DetectionOrchestrator, OrchestratorError, SubmissionReceipt};
pub use poll_scheduler::PollScheduler;
pub use token_cache::{CredentialExchange, IssuedToken, TokenCache};
