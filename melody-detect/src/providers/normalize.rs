//! Orientation of provider scores onto the canonical AI probability

use serde::Deserialize;

use super::ProviderError;

/// Binary label reported by verdict-style providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[serde(alias = "AI", alias = "Ai")]
    Ai,
    #[serde(alias = "HUMAN", alias = "Human")]
    Human,
}

impl Verdict {
    pub fn from_is_ai(is_ai: bool) -> Self {
        if is_ai {
            Verdict::Ai
        } else {
            Verdict::Human
        }
    }
}

/// Map a verdict + confidence pair onto "probability of AI"
///
/// "ai" with confidence c gives c; "human" with confidence c gives 1 - c.
pub fn orient(verdict: Verdict, confidence: f64) -> f64 {
    let c = confidence.clamp(0.0, 1.0);
    match verdict {
        Verdict::Ai => c,
        Verdict::Human => 1.0 - c,
    }
}

/// Validate a score field reported directly as a probability
///
/// Non-finite values are a protocol error; finite ones are clamped to [0, 1].
pub fn unit_score(provider: &str, field: &str, value: f64) -> Result<f64, ProviderError> {
    if !value.is_finite() {
        return Err(ProviderError::protocol(
            provider,
            format!("{} is not a finite number", field),
        ));
    }
    Ok(value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_over_confidence_grid() {
        for step in 0..=100 {
            let c = step as f64 / 100.0;

            let ai = orient(Verdict::Ai, c);
            let human = orient(Verdict::Human, c);

            assert!((0.0..=1.0).contains(&ai));
            assert!((0.0..=1.0).contains(&human));
            assert_eq!(ai, c);
            assert!((human - (1.0 - c)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_human_verdict_differs_from_confidence() {
        // 0.5 is the only point where both orientations coincide
        assert_ne!(orient(Verdict::Human, 0.9), 0.9);
        assert_eq!(orient(Verdict::Human, 0.5), 0.5);
    }

    #[test]
    fn test_out_of_range_confidence_is_clamped() {
        assert_eq!(orient(Verdict::Ai, 1.4), 1.0);
        assert_eq!(orient(Verdict::Human, -0.3), 1.0);
    }

    #[test]
    fn test_unit_score() {
        assert_eq!(unit_score("p", "score", 0.42).unwrap(), 0.42);
        assert_eq!(unit_score("p", "score", 3.0).unwrap(), 1.0);
        assert!(unit_score("p", "score", f64::NAN).is_err());
    }

    #[test]
    fn test_verdict_parsing() {
        let v: Verdict = serde_json::from_str("\"ai\"").unwrap();
        assert_eq!(v, Verdict::Ai);
        let v: Verdict = serde_json::from_str("\"Human\"").unwrap();
        assert_eq!(v, Verdict::Human);
        assert!(serde_json::from_str::<Verdict>("\"maybe\"").is_err());
        assert_eq!(Verdict::from_is_ai(false), Verdict::Human);
    }
}
