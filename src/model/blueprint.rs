//! The ground-truth crime: what happened, when, and what it left behind.

use serde::{Deserialize, Serialize};

use crate::model::content::EvidenceType;
use crate::model::time::{TimePoint, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrimeKind {
    Theft,
    Vandalism,
    Sabotage,
    Forgery,
}

impl std::fmt::Display for CrimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CrimeKind::Theft => "theft",
            CrimeKind::Vandalism => "vandalism",
            CrimeKind::Sabotage => "sabotage",
            CrimeKind::Forgery => "forgery",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CrimeKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "theft" => Ok(CrimeKind::Theft),
            "vandalism" => Ok(CrimeKind::Vandalism),
            "sabotage" => Ok(CrimeKind::Sabotage),
            "forgery" => Ok(CrimeKind::Forgery),
            other => Err(crate::error::Error::InvalidRequest(format!(
                "unknown crime kind: {other}"
            ))),
        }
    }
}

/// Created once per run by the blueprint phase; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeBlueprint {
    pub template_id: String,
    pub kind: CrimeKind,
    pub title: String,
    /// The object or target of the crime.
    pub target: String,
    /// Strictly increasing in time.
    pub steps: Vec<CrimeStep>,
    pub traces: Vec<TracePoint>,
    /// Spans the first step through the minute of the last step.
    pub crime_window: TimeWindow,
}

impl CrimeBlueprint {
    /// Distinct trace locations in first-seen (step) order.
    pub fn trace_locations(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for trace in &self.traces {
            if !seen.contains(&trace.location.as_str()) {
                seen.push(&trace.location);
            }
        }
        seen
    }

    pub fn is_trace_location(&self, location: &str) -> bool {
        self.traces.iter().any(|t| t.location == location)
    }

    pub fn trace(&self, id: &str) -> Option<&TracePoint> {
        self.traces.iter().find(|t| t.id == id)
    }

    pub fn step(&self, index: usize) -> Option<&CrimeStep> {
        self.steps.iter().find(|s| s.index == index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrimeStep {
    pub index: usize,
    pub at: TimePoint,
    pub description: String,
    pub location: String,
}

/// A location plus the physical signature a crime step left there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracePoint {
    pub id: String,
    pub step_index: usize,
    pub location: String,
    pub signature: PhysicalSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalSignature {
    /// What kind of evidence this trace can become.
    pub evidence_type: EvidenceType,
    pub description: String,
    /// Attribute a suspect must have to leave this trace (e.g. "master-key").
    /// `None` means anyone could have left it.
    #[serde(default)]
    pub requires: Option<String>,
}

impl PhysicalSignature {
    pub fn is_consistent_with(&self, attributes: &[String]) -> bool {
        match &self.requires {
            None => true,
            Some(attr) => attributes.iter().any(|a| a == attr),
        }
    }
}
