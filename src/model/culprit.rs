//! Audit trail of the culprit decision.

use serde::{Deserialize, Serialize};

use crate::model::suspect::SuspectId;

/// Exactly one suspect is guilty; this record explains why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CulpritDetermination {
    pub culprit_id: SuspectId,
    pub opportunity_score: f64,
    pub motive_score: f64,
    pub means_score: f64,
    pub trace_match_score: f64,
    pub composite_score: f64,
    pub rationale: String,
    /// Scores for every suspect, in ranking order (culprit first).
    pub scorecards: Vec<ScoreCard>,
}

impl CulpritDetermination {
    pub fn scorecard(&self, id: SuspectId) -> Option<&ScoreCard> {
        self.scorecards.iter().find(|c| c.suspect_id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub suspect_id: SuspectId,
    pub opportunity: f64,
    pub motive: f64,
    pub means: f64,
    pub trace_match: f64,
    pub composite: f64,
}
