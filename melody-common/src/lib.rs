//! # Melody Common Library
//!
//! Shared code for the melody detection services:
//! - Error type
//! - Bootstrap configuration loading
//! - Detection vocabulary (job states, conclusions, failure kinds)
//! - Event types and the broadcast EventBus

pub mod config;
pub mod detection;
pub mod error;
pub mod events;

pub use detection::{Conclusion, FailureKind, JobState};
pub use error::{Error, Result};
