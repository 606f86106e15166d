//! Crime templates, role archetypes and name pools.
//!
//! This is content, not logic: the builders only rely on the structure
//! below, so the case book can be swapped for another TOML file. The
//! built-in book is compiled into the binary from `assets/casebook.toml`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{CrimeKind, Difficulty, EvidenceType, GenerationRequest, MAX_SUSPECTS, Subject};

const BUILTIN: &str = include_str!("../../assets/casebook.toml");

/// Motive weight for roles a template does not list.
pub const DEFAULT_MOTIVE_WEIGHT: f64 = 0.2;

/// Shortest template, in steps. Rookie cases use exactly this many.
pub const MIN_TEMPLATE_STEPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateCatalog {
    pub names: Vec<String>,
    /// Places suspects can be seen away from the crime.
    pub alibi_locations: Vec<String>,
    /// Extra personality tags mixed into role tags.
    #[serde(default)]
    pub personality: Vec<String>,
    pub roles: Vec<RoleArchetype>,
    pub crimes: Vec<CrimeTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleArchetype {
    pub name: String,
    pub access: Vec<String>,
    pub attributes: Vec<String>,
    #[serde(default)]
    pub personality: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeTemplate {
    pub id: String,
    pub kind: CrimeKind,
    pub title: String,
    pub target: String,
    pub subjects: Vec<Subject>,
    pub difficulties: Vec<Difficulty>,
    /// Ways a suspect can be tied to the target.
    #[serde(default)]
    pub target_ties: Vec<String>,
    /// Role name to base motive weight.
    #[serde(default)]
    pub motive_weights: BTreeMap<String, f64>,
    pub steps: Vec<StepTemplate>,
    pub red_herrings: Vec<RedHerringTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub description: String,
    pub location: String,
    pub traces: Vec<TraceTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTemplate {
    pub evidence_type: EvidenceType,
    pub description: String,
    #[serde(default)]
    pub requires: Option<String>,
}

/// A misleading clue. `{suspect}` in the description is replaced with the
/// name of the innocent suspect it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedHerringTemplate {
    pub evidence_type: EvidenceType,
    pub title: String,
    pub description: String,
}

impl CrimeTemplate {
    pub fn supports(&self, request: &GenerationRequest) -> bool {
        self.subjects.contains(&request.subject)
            && self.difficulties.contains(&request.difficulty)
            && request
                .constraints
                .crime_kind
                .is_none_or(|kind| kind == self.kind)
    }

    pub fn motive_weight(&self, role: &str) -> f64 {
        self.motive_weights
            .get(role)
            .copied()
            .unwrap_or(DEFAULT_MOTIVE_WEIGHT)
    }

    pub fn trace_locations(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.location.as_str())
    }
}

impl TemplateCatalog {
    /// The case book shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let catalog: TemplateCatalog =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid case book: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Keep only the crimes `keep` accepts.
    pub fn retain_crimes(mut self, keep: impl Fn(&CrimeTemplate) -> bool) -> Self {
        self.crimes.retain(|c| keep(c));
        self
    }

    pub fn crime(&self, id: &str) -> Option<&CrimeTemplate> {
        self.crimes.iter().find(|c| c.id == id)
    }

    pub fn role(&self, name: &str) -> Option<&RoleArchetype> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Templates able to serve `request`, in catalog order.
    ///
    /// Never widens the search: no match is a [`Error::TemplateMismatch`].
    pub fn select(&self, request: &GenerationRequest) -> Result<Vec<&CrimeTemplate>> {
        let found: Vec<&CrimeTemplate> =
            self.crimes.iter().filter(|c| c.supports(request)).collect();
        if found.is_empty() {
            let kind = request
                .constraints
                .crime_kind
                .map(|k| format!(", kind {k}"))
                .unwrap_or_default();
            return Err(Error::TemplateMismatch(format!(
                "subject {}, difficulty {}{kind}",
                request.subject, request.difficulty
            )));
        }
        Ok(found)
    }

    /// Structural checks the builders rely on.
    pub fn validate(&self) -> Result<()> {
        if self.names.len() < MAX_SUSPECTS {
            return Err(invalid(format!(
                "need at least {MAX_SUSPECTS} names, found {}",
                self.names.len()
            )));
        }
        if self.roles.len() < MAX_SUSPECTS {
            return Err(invalid(format!(
                "need at least {MAX_SUSPECTS} roles, found {}",
                self.roles.len()
            )));
        }
        let mut role_names = HashSet::new();
        for role in &self.roles {
            if !role_names.insert(role.name.as_str()) {
                return Err(invalid(format!("duplicate role {}", role.name)));
            }
        }

        let mut ids = HashSet::new();
        for crime in &self.crimes {
            if !ids.insert(crime.id.as_str()) {
                return Err(invalid(format!("duplicate crime id {}", crime.id)));
            }
            if crime.steps.len() < MIN_TEMPLATE_STEPS {
                return Err(invalid(format!(
                    "crime {} has {} steps, need at least {MIN_TEMPLATE_STEPS}",
                    crime.id,
                    crime.steps.len()
                )));
            }
            if let Some(step) = crime.steps.iter().find(|s| s.traces.is_empty()) {
                return Err(invalid(format!(
                    "crime {} step \"{}\" leaves no trace",
                    crime.id, step.description
                )));
            }
            if crime.red_herrings.is_empty() {
                return Err(invalid(format!("crime {} has no red herrings", crime.id)));
            }
            if crime.subjects.is_empty() || crime.difficulties.is_empty() {
                return Err(invalid(format!(
                    "crime {} lists no subjects or difficulties",
                    crime.id
                )));
            }
            if let Some((role, w)) = crime
                .motive_weights
                .iter()
                .find(|(_, w)| !(0.0..=1.0).contains(*w))
            {
                return Err(invalid(format!(
                    "crime {} motive weight for {role} is out of range: {w}",
                    crime.id
                )));
            }
            let scene: HashSet<&str> = crime.trace_locations().collect();
            if self
                .alibi_locations
                .iter()
                .all(|l| scene.contains(l.as_str()))
            {
                return Err(invalid(format!(
                    "crime {} leaves no alibi location away from its traces",
                    crime.id
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> Error {
    Error::Config(format!("invalid case book: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GradeLevel, PuzzleComplexity};

    fn request(subject: Subject, difficulty: Difficulty) -> GenerationRequest {
        GenerationRequest::new(difficulty, subject, GradeLevel::P4, PuzzleComplexity::Basic)
    }

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = TemplateCatalog::builtin().unwrap();
        assert!(catalog.crimes.len() >= 5);
        assert!(catalog.roles.len() >= 8);
    }

    #[test]
    fn every_subject_and_difficulty_has_a_template() {
        let catalog = TemplateCatalog::builtin().unwrap();
        for subject in [Subject::Math, Subject::Science, Subject::English] {
            for difficulty in [
                Difficulty::Rookie,
                Difficulty::Inspector,
                Difficulty::Detective,
                Difficulty::Chief,
            ] {
                assert!(catalog.select(&request(subject, difficulty)).is_ok());
            }
        }
    }

    #[test]
    fn kind_constraint_can_mismatch() {
        let catalog = TemplateCatalog::builtin().unwrap();
        let req = request(Subject::Science, Difficulty::Rookie).crime_kind(CrimeKind::Forgery);
        let err = catalog.select(&req).unwrap_err();
        assert!(matches!(err, Error::TemplateMismatch(_)));
    }

    #[test]
    fn unlisted_role_gets_default_motive_weight() {
        let catalog = TemplateCatalog::builtin().unwrap();
        let crime = catalog.crime("missing-trophy").unwrap();
        assert_eq!(crime.motive_weight("Sports Coach"), 0.5);
        assert_eq!(crime.motive_weight("Music Teacher"), DEFAULT_MOTIVE_WEIGHT);
    }
}
