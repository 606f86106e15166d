//! Per-run state threaded through every phase.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::model::{
    CaseId, CaseSuspect, CrimeBlueprint, CulpritDetermination, EvidenceItem, GenerationRequest,
    MysteryCase, NarrativeLayer, Puzzle, Scene, SuspectProfile,
};
use crate::templates::CrimeTemplate;

/// The output field a phase is responsible for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextSlot {
    Blueprint,
    Suspects,
    Determination,
    Evidence,
    Scenes,
    Puzzles,
    Narrative,
    /// A keyed entry in [`GenerationContext::extensions`].
    Extension(String),
}

impl std::fmt::Display for ContextSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextSlot::Blueprint => write!(f, "blueprint"),
            ContextSlot::Suspects => write!(f, "suspects"),
            ContextSlot::Determination => write!(f, "determination"),
            ContextSlot::Evidence => write!(f, "evidence"),
            ContextSlot::Scenes => write!(f, "scenes"),
            ContextSlot::Puzzles => write!(f, "puzzles"),
            ContextSlot::Narrative => write!(f, "narrative"),
            ContextSlot::Extension(name) => write!(f, "extension:{name}"),
        }
    }
}

/// Owns every intermediate artifact of one run. Discarded on failure.
pub struct GenerationContext {
    pub request: GenerationRequest,
    pub seed: u64,
    /// The run's only source of randomness.
    pub rng: StdRng,
    /// Crime template chosen by the blueprint phase; content phases read
    /// its flavor data (red herrings, target ties, motive weights).
    pub template: Option<CrimeTemplate>,
    pub blueprint: Option<CrimeBlueprint>,
    pub suspects: Option<Vec<SuspectProfile>>,
    pub determination: Option<CulpritDetermination>,
    pub evidence: Option<Vec<EvidenceItem>>,
    pub scenes: Option<Vec<Scene>>,
    pub puzzles: Option<Vec<Puzzle>>,
    pub narrative: Option<NarrativeLayer>,
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl GenerationContext {
    pub fn new(request: GenerationRequest, seed: u64) -> Self {
        Self {
            request,
            seed,
            rng: StdRng::seed_from_u64(seed),
            template: None,
            blueprint: None,
            suspects: None,
            determination: None,
            evidence: None,
            scenes: None,
            puzzles: None,
            narrative: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn is_filled(&self, slot: &ContextSlot) -> bool {
        match slot {
            ContextSlot::Blueprint => self.blueprint.is_some(),
            ContextSlot::Suspects => self.suspects.is_some(),
            ContextSlot::Determination => self.determination.is_some(),
            ContextSlot::Evidence => self.evidence.is_some(),
            ContextSlot::Scenes => self.scenes.is_some(),
            ContextSlot::Puzzles => self.puzzles.is_some(),
            ContextSlot::Narrative => self.narrative.is_some(),
            ContextSlot::Extension(name) => self.extensions.contains_key(name),
        }
    }

    pub fn template(&self) -> Result<&CrimeTemplate> {
        self.template.as_ref().ok_or_else(|| missing("template"))
    }

    pub fn blueprint(&self) -> Result<&CrimeBlueprint> {
        self.blueprint.as_ref().ok_or_else(|| missing("blueprint"))
    }

    pub fn suspects(&self) -> Result<&[SuspectProfile]> {
        self.suspects.as_deref().ok_or_else(|| missing("suspects"))
    }

    pub fn determination(&self) -> Result<&CulpritDetermination> {
        self.determination
            .as_ref()
            .ok_or_else(|| missing("determination"))
    }

    pub fn evidence(&self) -> Result<&[EvidenceItem]> {
        self.evidence.as_deref().ok_or_else(|| missing("evidence"))
    }

    pub fn scenes(&self) -> Result<&[Scene]> {
        self.scenes.as_deref().ok_or_else(|| missing("scenes"))
    }

    /// Assemble the finished case. Guilt is stamped onto the suspects here,
    /// from the determination, and nowhere else.
    pub fn into_case(self) -> Result<MysteryCase> {
        let blueprint = self.blueprint.ok_or_else(|| missing("blueprint"))?;
        let determination = self
            .determination
            .ok_or_else(|| missing("determination"))?;
        let suspects = self
            .suspects
            .ok_or_else(|| missing("suspects"))?
            .into_iter()
            .map(|profile| CaseSuspect {
                is_guilty: profile.id == determination.culprit_id,
                profile,
            })
            .collect();

        Ok(MysteryCase {
            id: CaseId::new(),
            request: self.request,
            seed: self.seed,
            blueprint,
            suspects,
            determination,
            evidence: self.evidence.ok_or_else(|| missing("evidence"))?,
            scenes: self.scenes.ok_or_else(|| missing("scenes"))?,
            puzzles: self.puzzles.ok_or_else(|| missing("puzzles"))?,
            narrative: self.narrative.ok_or_else(|| missing("narrative"))?,
            created_at: Utc::now(),
        })
    }
}

fn missing(what: &str) -> Error {
    Error::Phase {
        phase: "context".to_string(),
        message: format!("{what} has not been produced yet"),
    }
}
