//! Generation requests: the immutable, validated input to one pipeline run.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::blueprint::CrimeKind;

/// Smallest and largest suspect pool the pipeline will build.
pub const MIN_SUSPECTS: usize = 3;
pub const MAX_SUSPECTS: usize = 4;

/// A request for one mystery case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub difficulty: Difficulty,
    pub subject: Subject,
    pub grade_level: GradeLevel,
    pub puzzle_complexity: PuzzleComplexity,
    #[serde(default)]
    pub constraints: Constraints,
}

/// Optional narrowing of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Explicit RNG seed. Two requests with the same seed and parameters
    /// produce the same case.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Override the difficulty-derived suspect count.
    #[serde(default)]
    pub suspect_count: Option<usize>,
    /// Only consider crime templates of this kind.
    #[serde(default)]
    pub crime_kind: Option<CrimeKind>,
    /// Role archetypes that must not appear in the suspect pool.
    #[serde(default)]
    pub excluded_roles: Vec<String>,
}

impl GenerationRequest {
    pub fn new(
        difficulty: Difficulty,
        subject: Subject,
        grade_level: GradeLevel,
        puzzle_complexity: PuzzleComplexity,
    ) -> Self {
        Self {
            difficulty,
            subject,
            grade_level,
            puzzle_complexity,
            constraints: Constraints::default(),
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.constraints.seed = Some(seed);
        self
    }

    pub fn suspect_count(mut self, n: usize) -> Self {
        self.constraints.suspect_count = Some(n);
        self
    }

    pub fn crime_kind(mut self, kind: CrimeKind) -> Self {
        self.constraints.crime_kind = Some(kind);
        self
    }

    pub fn exclude_role(mut self, role: impl Into<String>) -> Self {
        self.constraints.excluded_roles.push(role.into());
        self
    }

    /// Validate the request at the API boundary. Internal components assume
    /// a request that passed this check.
    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.constraints.suspect_count {
            if !(MIN_SUSPECTS..=MAX_SUSPECTS).contains(&n) {
                return Err(Error::InvalidRequest(format!(
                    "suspect_count must be between {MIN_SUSPECTS} and {MAX_SUSPECTS}, got {n}"
                )));
            }
        }
        if self
            .constraints
            .excluded_roles
            .iter()
            .any(|r| r.trim().is_empty())
        {
            return Err(Error::InvalidRequest(
                "excluded_roles must not contain blank names".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of suspects this request asks for.
    pub fn suspect_target(&self) -> usize {
        self.constraints
            .suspect_count
            .unwrap_or_else(|| self.difficulty.suspect_count())
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Rookie,
    Inspector,
    Detective,
    Chief,
}

impl Difficulty {
    pub fn suspect_count(self) -> usize {
        match self {
            Difficulty::Rookie | Difficulty::Inspector => 3,
            Difficulty::Detective | Difficulty::Chief => 4,
        }
    }

    /// Number of crime steps instantiated from a template.
    pub fn step_count(self) -> usize {
        match self {
            Difficulty::Rookie => 3,
            Difficulty::Inspector => 4,
            Difficulty::Detective => 5,
            Difficulty::Chief => 6,
        }
    }

    /// Number of suspects left without an alibi for the crime window.
    pub fn open_suspects(self) -> usize {
        match self {
            Difficulty::Rookie => 1,
            Difficulty::Inspector | Difficulty::Detective => 2,
            Difficulty::Chief => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Math,
    Science,
    English,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GradeLevel {
    P1,
    P2,
    P3,
    P4,
    P5,
    P6,
}

impl GradeLevel {
    /// 1-based year number.
    pub fn year(self) -> u8 {
        match self {
            GradeLevel::P1 => 1,
            GradeLevel::P2 => 2,
            GradeLevel::P3 => 3,
            GradeLevel::P4 => 4,
            GradeLevel::P5 => 5,
            GradeLevel::P6 => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleComplexity {
    Basic,
    Standard,
    Challenging,
}

impl PuzzleComplexity {
    pub fn puzzle_count(self) -> usize {
        match self {
            PuzzleComplexity::Basic => 3,
            PuzzleComplexity::Standard => 4,
            PuzzleComplexity::Challenging => 5,
        }
    }

    /// 1 for basic, up to 3 for challenging.
    pub fn level(self) -> u32 {
        match self {
            PuzzleComplexity::Basic => 1,
            PuzzleComplexity::Standard => 2,
            PuzzleComplexity::Challenging => 3,
        }
    }
}

macro_rules! display_and_parse {
    ($ty:ty { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = match self {
                    $(<$ty>::$variant => $s,)+
                };
                write!(f, "{s}")
            }
        }

        impl std::str::FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_ascii_lowercase().as_str() {
                    $($s => Ok(<$ty>::$variant),)+
                    other => Err(Error::InvalidRequest(format!(
                        "unknown {}: {other}",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

display_and_parse!(Difficulty {
    Rookie => "rookie",
    Inspector => "inspector",
    Detective => "detective",
    Chief => "chief",
});

display_and_parse!(Subject {
    Math => "math",
    Science => "science",
    English => "english",
});

display_and_parse!(GradeLevel {
    P1 => "p1",
    P2 => "p2",
    P3 => "p3",
    P4 => "p4",
    P5 => "p5",
    P6 => "p6",
});

display_and_parse!(PuzzleComplexity {
    Basic => "basic",
    Standard => "standard",
    Challenging => "challenging",
});
