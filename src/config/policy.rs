//! Generation policy: the tunable knobs of the pipeline and its gates.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! yields the stock policy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationPolicy {
    pub weights: ScoringWeights,
    pub quality: QualityThresholds,
    /// Minimum uniqueness (1 - matching facets / 4) a similar case must reach.
    pub min_uniqueness: f64,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            quality: QualityThresholds::default(),
            min_uniqueness: 0.5,
        }
    }
}

impl GenerationPolicy {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let policy: GenerationPolicy =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid policy: {e}")))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [
            ("opportunity", w.opportunity),
            ("trace_match", w.trace_match),
            ("motive", w.motive),
            ("means", w.means),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "weight {name} must be within [0, 1], got {value}"
                )));
            }
        }
        if w.opportunity <= 0.0 {
            return Err(Error::Config(
                "opportunity weight must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_uniqueness) {
            return Err(Error::Config(format!(
                "min_uniqueness must be within [0, 1], got {}",
                self.min_uniqueness
            )));
        }
        Ok(())
    }
}

/// Weights of the composite guilt score.
///
/// Opportunity carries the most weight; the remaining factors order the
/// tie-breaks as trace match, motive, means.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub opportunity: f64,
    pub trace_match: f64,
    pub motive: f64,
    pub means: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            opportunity: 0.40,
            trace_match: 0.25,
            motive: 0.20,
            means: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_suspects: usize,
    pub min_puzzles: usize,
    pub min_critical_evidence: usize,
    pub min_scenes: usize,
    /// Whole words, matched case-insensitively, that must not appear in prose.
    pub blocked_words: Vec<String>,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_suspects: 3,
            min_puzzles: 3,
            min_critical_evidence: 2,
            min_scenes: 3,
            blocked_words: [
                "blood", "kill", "killed", "murder", "dead", "corpse", "weapon", "gun", "knife",
                "stab", "drunk", "drugs",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let policy = GenerationPolicy::from_toml_str("").unwrap();
        assert_eq!(policy, GenerationPolicy::default());
    }

    #[test]
    fn partial_weights_keep_other_defaults() {
        let policy = GenerationPolicy::from_toml_str("[weights]\nmotive = 0.3\n").unwrap();
        assert_eq!(policy.weights.motive, 0.3);
        assert_eq!(policy.weights.opportunity, 0.40);
    }

    #[test]
    fn zero_opportunity_weight_is_rejected() {
        let err = GenerationPolicy::from_toml_str("[weights]\nopportunity = 0.0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
