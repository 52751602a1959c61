//! Canonical, provider-agnostic detection outcome

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::job::ProviderJob;

/// Probabilities strictly above this count as an "AI" verdict; 0.5 itself is human.
pub const AI_THRESHOLD: f64 = 0.5;

/// One named score reported by a provider (generator, suspected model, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub name: String,
    pub score: f64,
}

/// Normalized result of one provider
///
/// `ai_probability` is always oriented so that 1.0 means "certainly AI".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionOutcome {
    pub provider_id: String,
    pub ai_probability: f64,
    pub confidence: Option<f64>,
    pub label_details: Vec<LabelScore>,
    /// Untouched provider payload, for diagnostics
    pub raw: Value,
}

impl DetectionOutcome {
    /// Create an outcome, clamping the probability to [0, 1]
    pub fn new(provider_id: impl Into<String>, ai_probability: f64, raw: Value) -> Self {
        Self {
            provider_id: provider_id.into(),
            ai_probability: ai_probability.clamp(0.0, 1.0),
            confidence: None,
            label_details: Vec::new(),
            raw,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_labels(mut self, labels: Vec<LabelScore>) -> Self {
        self.label_details = labels;
        self
    }

    /// Whether this provider's verdict is "AI" (strictly above the threshold)
    pub fn says_ai(&self) -> bool {
        self.ai_probability > AI_THRESHOLD
    }
}

/// Response shape handed to the presentation layer for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalResult {
    /// "done", "pending" or "failed"
    pub status: &'static str,
    pub ai_probability: Option<f64>,
    pub confidence: Option<f64>,
    pub provider: String,
    pub raw: Value,
}

impl From<&ProviderJob> for CanonicalResult {
    fn from(job: &ProviderJob) -> Self {
        let outcome = job.outcome();
        Self {
            status: job.state().status_label(),
            ai_probability: outcome.map(|o| o.ai_probability),
            confidence: outcome.and_then(|o| o.confidence),
            provider: job.provider_id().to_string(),
            raw: outcome
                .map(|o| o.raw.clone())
                .unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(DetectionOutcome::new("p", 1.7, json!({})).ai_probability, 1.0);
        assert_eq!(DetectionOutcome::new("p", -0.2, json!({})).ai_probability, 0.0);
        let outcome = DetectionOutcome::new("p", 0.3, json!({})).with_confidence(4.0);
        assert_eq!(outcome.confidence, Some(1.0));
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!DetectionOutcome::new("p", 0.5, json!({})).says_ai());
        assert!(DetectionOutcome::new("p", 0.5001, json!({})).says_ai());
    }

    #[test]
    fn test_canonical_result_for_finished_job() {
        let mut job = ProviderJob::new("aiornot");
        let outcome = DetectionOutcome::new("aiornot", 0.8, json!({"report": {}})).with_confidence(0.8);
        job.complete(outcome).unwrap();

        let view = CanonicalResult::from(&job);
        assert_eq!(view.status, "done");
        assert_eq!(view.ai_probability, Some(0.8));
        assert_eq!(view.confidence, Some(0.8));
        assert_eq!(view.provider, "aiornot");
        assert_eq!(view.raw, json!({"report": {}}));
    }

    #[test]
    fn test_canonical_result_for_pending_job() {
        let job = ProviderJob::new("ircam");
        let view = CanonicalResult::from(&job);
        assert_eq!(view.status, "pending");
        assert_eq!(view.ai_probability, None);
        assert_eq!(view.raw, json!({}));
    }
}
