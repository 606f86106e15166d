//! The assembled, player-ready case.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::blueprint::CrimeBlueprint;
use crate::model::content::{EvidenceItem, NarrativeLayer, Puzzle, Relevance, Scene};
use crate::model::culprit::CulpritDetermination;
use crate::model::request::GenerationRequest;
use crate::model::suspect::{SuspectId, SuspectProfile};

/// Newtype for case IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(pub Uuid);

impl CaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A suspect as it appears in a finished case. Guilt exists only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSuspect {
    #[serde(flatten)]
    pub profile: SuspectProfile,
    pub is_guilty: bool,
}

impl Deref for CaseSuspect {
    type Target = SuspectProfile;

    fn deref(&self) -> &SuspectProfile {
        &self.profile
    }
}

impl DerefMut for CaseSuspect {
    fn deref_mut(&mut self) -> &mut SuspectProfile {
        &mut self.profile
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MysteryCase {
    pub id: CaseId,
    pub request: GenerationRequest,
    pub seed: u64,
    pub blueprint: CrimeBlueprint,
    pub suspects: Vec<CaseSuspect>,
    pub determination: CulpritDetermination,
    pub evidence: Vec<EvidenceItem>,
    pub scenes: Vec<Scene>,
    pub puzzles: Vec<Puzzle>,
    pub narrative: NarrativeLayer,
    pub created_at: DateTime<Utc>,
}

impl MysteryCase {
    pub fn suspect(&self, id: SuspectId) -> Option<&CaseSuspect> {
        self.suspects.iter().find(|s| s.id == id)
    }

    pub fn culprit(&self) -> Option<&CaseSuspect> {
        self.suspect(self.determination.culprit_id)
    }

    pub fn evidence_with(&self, relevance: Relevance) -> impl Iterator<Item = &EvidenceItem> {
        self.evidence.iter().filter(move |e| e.relevance == relevance)
    }

    /// Every piece of generated prose, for content scans.
    pub fn prose(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.narrative.texts();
        out.push(&self.blueprint.title);
        out.extend(self.blueprint.steps.iter().map(|s| s.description.as_str()));
        for suspect in &self.suspects {
            for node in &suspect.dialogue {
                out.push(&node.prompt);
                out.push(&node.response);
            }
        }
        for item in &self.evidence {
            out.push(&item.title);
            out.push(&item.description);
        }
        for scene in &self.scenes {
            out.push(&scene.title);
            out.push(&scene.description);
        }
        for puzzle in &self.puzzles {
            out.push(&puzzle.question);
            out.push(&puzzle.hint);
        }
        out
    }
}
