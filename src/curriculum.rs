//! Curriculum topics that puzzles are tagged with.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{GradeLevel, PuzzleSkill, Subject, TopicTag};

const BUILTIN: &str = include_str!("../assets/curriculum.toml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumTopic {
    pub code: String,
    pub title: String,
    pub skill: PuzzleSkill,
}

impl CurriculumTopic {
    pub fn tag(&self) -> TopicTag {
        TopicTag {
            code: self.code.clone(),
            title: self.title.clone(),
        }
    }
}

/// Supplies the topics taught for a grade and subject.
pub trait TopicSelector: Send + Sync {
    /// Topics in a stable order. Empty when nothing is taught.
    fn topics_for(&self, grade: GradeLevel, subject: Subject) -> Vec<CurriculumTopic>;
}

/// A fixed topic table, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticCurriculum {
    topics: Vec<TopicEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TopicEntry {
    code: String,
    title: String,
    subject: Subject,
    grades: Vec<GradeLevel>,
    skill: PuzzleSkill,
}

impl StaticCurriculum {
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("invalid curriculum: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn empty() -> Self {
        Self { topics: Vec::new() }
    }
}

impl TopicSelector for StaticCurriculum {
    fn topics_for(&self, grade: GradeLevel, subject: Subject) -> Vec<CurriculumTopic> {
        self.topics
            .iter()
            .filter(|t| t.subject == subject && t.grades.contains(&grade))
            .map(|t| CurriculumTopic {
                code: t.code.clone(),
                title: t.title.clone(),
                skill: t.skill,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_grade_and_subject_has_topics() {
        let curriculum = StaticCurriculum::builtin().unwrap();
        for grade in [
            GradeLevel::P1,
            GradeLevel::P2,
            GradeLevel::P3,
            GradeLevel::P4,
            GradeLevel::P5,
            GradeLevel::P6,
        ] {
            for subject in [Subject::Math, Subject::Science, Subject::English] {
                assert!(
                    !curriculum.topics_for(grade, subject).is_empty(),
                    "{grade} {subject}"
                );
            }
        }
    }

    #[test]
    fn division_starts_in_p3() {
        let curriculum = StaticCurriculum::builtin().unwrap();
        let p2 = curriculum.topics_for(GradeLevel::P2, Subject::Math);
        let p3 = curriculum.topics_for(GradeLevel::P3, Subject::Math);
        assert!(!p2.iter().any(|t| t.skill == PuzzleSkill::Division));
        assert!(p3.iter().any(|t| t.skill == PuzzleSkill::Division));
    }
}
