//! HTTP API handlers for melody-detect
//!
//! Thin layer over [`crate::services::DetectionOrchestrator`]; REST for
//! submission and retrieval, SSE for pushed progress.

pub mod detect;
pub mod health;
pub mod providers;
pub mod results;
pub mod sse;

pub use detect::detection_routes;
pub use health::health_routes;
pub use providers::provider_routes;
pub use results::{result_routes, JobView};
