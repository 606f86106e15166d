//! Quality gate: a checklist run over a finished case.
//!
//! Every rule runs; failures are collected so the caller sees the whole
//! list at once.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::policy::QualityThresholds;
use crate::error::{Error, Result};
use crate::model::{MysteryCase, Relevance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRule {
    MinSuspects,
    SingleCulprit,
    CulpritOpportunity,
    MinPuzzles,
    PuzzleComplete,
    MinCriticalEvidence,
    CriticalLinksCulprit,
    RedHerringExcludesCulprit,
    MinScenes,
    ContentSafety,
}

impl std::fmt::Display for QualityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QualityRule::MinSuspects => "min_suspects",
            QualityRule::SingleCulprit => "single_culprit",
            QualityRule::CulpritOpportunity => "culprit_opportunity",
            QualityRule::MinPuzzles => "min_puzzles",
            QualityRule::PuzzleComplete => "puzzle_complete",
            QualityRule::MinCriticalEvidence => "min_critical_evidence",
            QualityRule::CriticalLinksCulprit => "critical_links_culprit",
            QualityRule::RedHerringExcludesCulprit => "red_herring_excludes_culprit",
            QualityRule::MinScenes => "min_scenes",
            QualityRule::ContentSafety => "content_safety",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityViolation {
    pub rule: QualityRule,
    pub detail: String,
}

impl QualityViolation {
    fn new(rule: QualityRule, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for QualityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.rule, self.detail)
    }
}

pub struct QualityValidator {
    thresholds: QualityThresholds,
    blocked: Vec<String>,
}

impl QualityValidator {
    pub fn new(thresholds: QualityThresholds) -> Self {
        let blocked = thresholds
            .blocked_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { thresholds, blocked }
    }

    /// Run every rule and return all violations, in rule order.
    pub fn check(&self, case: &MysteryCase) -> Vec<QualityViolation> {
        let t = &self.thresholds;
        let mut out = Vec::new();

        if case.suspects.len() < t.min_suspects {
            out.push(QualityViolation::new(
                QualityRule::MinSuspects,
                format!(
                    "{} suspects, need at least {}",
                    case.suspects.len(),
                    t.min_suspects
                ),
            ));
        }

        let guilty: Vec<_> = case.suspects.iter().filter(|s| s.is_guilty).collect();
        if guilty.len() != 1 {
            out.push(QualityViolation::new(
                QualityRule::SingleCulprit,
                format!("{} suspects marked guilty, need exactly one", guilty.len()),
            ));
        } else if guilty[0].id != case.determination.culprit_id {
            out.push(QualityViolation::new(
                QualityRule::SingleCulprit,
                format!(
                    "{} is marked guilty but the determination names {}",
                    guilty[0].id, case.determination.culprit_id
                ),
            ));
        }

        if case.determination.opportunity_score <= 0.0 {
            out.push(QualityViolation::new(
                QualityRule::CulpritOpportunity,
                format!(
                    "culprit {} had no opportunity during {}",
                    case.determination.culprit_id, case.blueprint.crime_window
                ),
            ));
        }

        if case.puzzles.len() < t.min_puzzles {
            out.push(QualityViolation::new(
                QualityRule::MinPuzzles,
                format!(
                    "{} puzzles, need at least {}",
                    case.puzzles.len(),
                    t.min_puzzles
                ),
            ));
        }
        for puzzle in &case.puzzles {
            if puzzle.question.trim().is_empty() || puzzle.answer.trim().is_empty() {
                out.push(QualityViolation::new(
                    QualityRule::PuzzleComplete,
                    format!("puzzle {} is missing its question or answer", puzzle.id),
                ));
            }
        }

        let critical: Vec<_> = case.evidence_with(Relevance::Critical).collect();
        if critical.len() < t.min_critical_evidence {
            out.push(QualityViolation::new(
                QualityRule::MinCriticalEvidence,
                format!(
                    "{} critical evidence items, need at least {}",
                    critical.len(),
                    t.min_critical_evidence
                ),
            ));
        }
        let culprit = case.determination.culprit_id;
        for item in critical {
            if !item.links(culprit) {
                out.push(QualityViolation::new(
                    QualityRule::CriticalLinksCulprit,
                    format!("critical evidence {} does not link the culprit", item.id),
                ));
            }
        }
        for item in case.evidence_with(Relevance::RedHerring) {
            if item.links(culprit) {
                out.push(QualityViolation::new(
                    QualityRule::RedHerringExcludesCulprit,
                    format!("red herring {} links the culprit", item.id),
                ));
            }
        }

        if case.scenes.len() < t.min_scenes {
            out.push(QualityViolation::new(
                QualityRule::MinScenes,
                format!(
                    "{} scenes, need at least {}",
                    case.scenes.len(),
                    t.min_scenes
                ),
            ));
        }

        for word in self.blocked_hits(case) {
            out.push(QualityViolation::new(
                QualityRule::ContentSafety,
                format!("blocked word \"{word}\" in generated prose"),
            ));
        }

        debug!(case_id = %case.id, violations = out.len(), "quality check complete");
        out
    }

    /// Like [`check`](Self::check), but folds violations into an error.
    pub fn validate(&self, case: &MysteryCase) -> Result<()> {
        let violations = self.check(case);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::QualityViolation(violations))
        }
    }

    /// Distinct blocked words found, in list order.
    fn blocked_hits(&self, case: &MysteryCase) -> Vec<&str> {
        let mut words = std::collections::HashSet::new();
        for text in case.prose() {
            for word in text.split(|c: char| !c.is_alphanumeric() && c != '\'') {
                let word = word.trim_matches('\'');
                if !word.is_empty() {
                    words.insert(word.to_lowercase());
                }
            }
        }
        self.blocked
            .iter()
            .filter(|w| words.contains(w.as_str()))
            .map(|w| w.as_str())
            .collect()
    }
}
