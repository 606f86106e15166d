//! Player-facing artifacts: evidence, scenes, puzzles, narrative, asset specs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::suspect::SuspectId;

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub evidence_type: EvidenceType,
    pub relevance: Relevance,
    pub title: String,
    pub description: String,
    pub linked_suspect_ids: Vec<SuspectId>,
    pub linked_trace_id: Option<String>,
}

impl EvidenceItem {
    pub fn links(&self, id: SuspectId) -> bool {
        self.linked_suspect_ids.contains(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Physical,
    Document,
    Testimony,
    Digital,
}

impl std::fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvidenceType::Physical => "physical",
            EvidenceType::Document => "document",
            EvidenceType::Testimony => "testimony",
            EvidenceType::Digital => "digital",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    Critical,
    Supporting,
    RedHerring,
}

// ---------------------------------------------------------------------------
// Scenes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub kind: SceneKind,
    pub title: String,
    pub location: String,
    pub description: String,
    pub suspect_ids: Vec<SuspectId>,
    pub evidence_ids: Vec<String>,
    pub backdrop: AssetSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    Briefing,
    CrimeScene,
    Interview,
}

// ---------------------------------------------------------------------------
// Puzzles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Puzzle {
    pub id: String,
    pub title: String,
    pub question: String,
    /// Deterministic, checkable answer.
    pub answer: String,
    pub hint: String,
    pub topic: TopicTag,
    pub skill: PuzzleSkill,
    /// Evidence item revealed when the puzzle is solved.
    pub unlocks_evidence: Option<String>,
}

impl Puzzle {
    /// Compare an attempt against the answer, ignoring case and surrounding
    /// whitespace.
    pub fn check(&self, attempt: &str) -> bool {
        normalize_answer(attempt) == normalize_answer(&self.answer)
    }
}

fn normalize_answer(s: &str) -> String {
    s.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Curriculum tag carried by a puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicTag {
    pub code: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleSkill {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    ElapsedTime,
    NumberPattern,
    CaesarCipher,
    Anagram,
    StatesOfMatter,
    FoodChain,
}

// ---------------------------------------------------------------------------
// Narrative
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeLayer {
    pub title: String,
    pub briefing: String,
    pub suspect_intros: Vec<SuspectIntro>,
    pub scene_captions: Vec<SceneCaption>,
    /// Explains the solution; shown after the player accuses.
    pub solution: String,
    pub epilogue: String,
    /// Short hook written by a completion provider after the pipeline.
    #[serde(default)]
    pub teaser: Option<String>,
}

impl NarrativeLayer {
    /// Every prose fragment in the layer.
    pub fn texts(&self) -> Vec<&str> {
        let mut out = vec![
            self.title.as_str(),
            self.briefing.as_str(),
            self.solution.as_str(),
            self.epilogue.as_str(),
        ];
        out.extend(self.suspect_intros.iter().map(|i| i.text.as_str()));
        out.extend(self.scene_captions.iter().map(|c| c.caption.as_str()));
        if let Some(teaser) = &self.teaser {
            out.push(teaser);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspectIntro {
    pub suspect_id: SuspectId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneCaption {
    pub scene_id: String,
    pub caption: String,
}

// ---------------------------------------------------------------------------
// Asset specifications
// ---------------------------------------------------------------------------

/// A prompt plus metadata for the image generator. The core only emits these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub kind: AssetKind,
    pub prompt: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Portrait,
    Backdrop,
}

impl AssetSpec {
    pub fn new(kind: AssetKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn puzzle(answer: &str) -> Puzzle {
        Puzzle {
            id: "P1".into(),
            title: "t".into(),
            question: "q".into(),
            answer: answer.into(),
            hint: "h".into(),
            topic: TopicTag {
                code: "c".into(),
                title: "t".into(),
            },
            skill: PuzzleSkill::Anagram,
            unlocks_evidence: None,
        }
    }

    #[test]
    fn check_ignores_case_and_spacing() {
        let p = puzzle("Trophy  Hall");
        assert!(p.check("  trophy hall "));
        assert!(!p.check("trophy"));
    }
}
