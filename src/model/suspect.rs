//! Suspect profiles, generated without knowledge of who is guilty.

use serde::{Deserialize, Serialize};

use crate::model::content::AssetSpec;
use crate::model::time::TimeWindow;

/// Ordinal suspect identifier. Lower ids win culprit ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuspectId(pub u8);

impl std::fmt::Display for SuspectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectProfile {
    pub id: SuspectId,
    pub name: String,
    pub role: String,
    /// Things this suspect carries or can do (e.g. "master-key").
    pub attributes: Vec<String>,
    /// Locations this suspect's role grants access to.
    pub access: Vec<String>,
    pub personality: Vec<String>,
    /// Sorted by start time.
    pub movements: Vec<SuspectMovement>,
    pub relationships: Vec<Relationship>,
    /// How this suspect relates to the crime target, if at all.
    pub target_tie: Option<String>,
    pub dialogue: Vec<DialogueNode>,
    pub portrait: AssetSpec,
}

impl SuspectProfile {
    /// Witnessed movements, which are the only ones that count as alibis.
    pub fn witnessed(&self) -> impl Iterator<Item = &SuspectMovement> {
        self.movements
            .iter()
            .filter(|m| m.kind == MovementKind::Witnessed)
    }

    /// True when two witnessed movements overlap. Claimed movements are
    /// uncorroborated and may sit anywhere.
    pub fn has_self_overlap(&self) -> bool {
        let mut windows: Vec<TimeWindow> = self.witnessed().map(|m| m.window).collect();
        windows.sort_by_key(|w| w.start());
        windows.windows(2).any(|pair| pair[0].overlaps(&pair[1]))
    }

    pub fn related_to(&self, other: SuspectId) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.other == other)
    }

    pub fn has_access_to(&self, location: &str) -> bool {
        self.access.iter().any(|a| a == location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspectMovement {
    pub window: TimeWindow,
    pub location: String,
    pub kind: MovementKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Corroborated by a witness or record.
    Witnessed,
    /// Stated by the suspect only; a feigned alibi.
    Claimed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub other: SuspectId,
    pub kind: RelationKind,
}

/// Symmetric relationship kinds: both sides carry the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Friend,
    Rival,
    Colleague,
    Cousin,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::Friend,
        RelationKind::Rival,
        RelationKind::Colleague,
        RelationKind::Cousin,
    ];
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RelationKind::Friend => "friend",
            RelationKind::Rival => "rival",
            RelationKind::Colleague => "colleague",
            RelationKind::Cousin => "cousin",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: String,
    pub prompt: String,
    pub response: String,
}
