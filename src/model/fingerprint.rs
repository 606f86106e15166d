//! Case fingerprints: derived hashes used for duplicate detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Never hand-edited; see [`crate::validate::fingerprint`] for how it is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFingerprint {
    pub structure_hash: String,
    pub character_hash: String,
    pub puzzle_hash: String,
    pub location_hash: String,
    pub combined_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// One of the four independently hashed facets of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Structure,
    Character,
    Puzzle,
    Location,
}

impl CaseFingerprint {
    pub fn facet(&self, facet: Facet) -> &str {
        match facet {
            Facet::Structure => &self.structure_hash,
            Facet::Character => &self.character_hash,
            Facet::Puzzle => &self.puzzle_hash,
            Facet::Location => &self.location_hash,
        }
    }

    /// Facets whose hashes are equal in both fingerprints.
    pub fn matching_facets(&self, other: &CaseFingerprint) -> Vec<Facet> {
        [Facet::Structure, Facet::Character, Facet::Puzzle, Facet::Location]
            .into_iter()
            .filter(|f| self.facet(*f) == other.facet(*f))
            .collect()
    }
}
