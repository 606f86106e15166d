//! Puzzle phase.
//!
//! Every puzzle is tagged with a curriculum topic for the request's grade
//! and subject, has a single checkable answer, and unlocks one piece of
//! real (non red-herring) evidence.

use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use super::{ContextSlot, GenerationContext, GenerationPhase};
use crate::curriculum::TopicSelector;
use crate::error::{Error, Result};
use crate::model::{CrimeBlueprint, Puzzle, PuzzleSkill, Relevance};

pub struct PuzzlePhase {
    curriculum: Arc<dyn TopicSelector>,
}

impl PuzzlePhase {
    pub fn new(curriculum: Arc<dyn TopicSelector>) -> Self {
        Self { curriculum }
    }
}

impl GenerationPhase for PuzzlePhase {
    fn name(&self) -> &'static str {
        "puzzles"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Puzzles
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<()> {
        let grade = ctx.request.grade_level;
        let subject = ctx.request.subject;
        let mut topics = self.curriculum.topics_for(grade, subject);
        if topics.is_empty() {
            return Err(Error::NoCurriculumTopics(format!("{grade} {subject}")));
        }
        topics.shuffle(&mut ctx.rng);

        let count = ctx.request.puzzle_complexity.puzzle_count();
        let shape = Shape {
            level: ctx.request.puzzle_complexity.level(),
            year: u32::from(grade.year()),
        };
        let unlockable: Vec<String> = ctx
            .evidence()?
            .iter()
            .filter(|e| e.relevance != Relevance::RedHerring)
            .map(|e| e.id.clone())
            .collect();
        let blueprint = ctx.blueprint()?.clone();

        let mut puzzles = Vec::with_capacity(count);
        for i in 0..count {
            let topic = &topics[i % topics.len()];
            let draft = draft(topic.skill, shape, &blueprint, &mut ctx.rng);
            puzzles.push(Puzzle {
                id: format!("P{}", i + 1),
                title: format!("Puzzle {}: {}", i + 1, topic.title),
                question: draft.question,
                answer: draft.answer,
                hint: draft.hint,
                topic: topic.tag(),
                skill: topic.skill,
                unlocks_evidence: unlockable.get(i % unlockable.len().max(1)).cloned(),
            });
        }

        ctx.puzzles = Some(puzzles);
        Ok(())
    }
}

/// Difficulty knobs: complexity level (1-3) and school year (1-6).
#[derive(Debug, Clone, Copy)]
struct Shape {
    level: u32,
    year: u32,
}

impl Shape {
    /// Upper bound for operands in addition and subtraction.
    fn magnitude(self) -> u32 {
        match self.year {
            1 => 20,
            2 => 100,
            3 => 1000,
            _ => 10_000,
        }
        .min(10u32.pow(self.level + 1).max(20))
    }
}

struct Draft {
    question: String,
    answer: String,
    hint: String,
}

fn draft(skill: PuzzleSkill, shape: Shape, blueprint: &CrimeBlueprint, rng: &mut impl Rng) -> Draft {
    match skill {
        PuzzleSkill::Addition => addition(shape, blueprint, rng),
        PuzzleSkill::Subtraction => subtraction(shape, blueprint, rng),
        PuzzleSkill::Multiplication => multiplication(shape, rng),
        PuzzleSkill::Division => division(shape, rng),
        PuzzleSkill::ElapsedTime => elapsed_time(blueprint, rng),
        PuzzleSkill::NumberPattern => number_pattern(shape, rng),
        PuzzleSkill::CaesarCipher => caesar(shape, blueprint, rng),
        PuzzleSkill::Anagram => anagram(blueprint, rng),
        PuzzleSkill::StatesOfMatter => states_of_matter(rng),
        PuzzleSkill::FoodChain => food_chain(rng),
    }
}

fn addition(shape: Shape, blueprint: &CrimeBlueprint, rng: &mut impl Rng) -> Draft {
    let max = shape.magnitude() / 2;
    let a = rng.gen_range(1..=max);
    let b = rng.gen_range(1..=max);
    let place = blueprint.steps[0].location.as_str();
    Draft {
        question: format!(
            "The detectives counted {a} footprints in the {place} and {b} more in the corridor. How many footprints is that altogether?"
        ),
        answer: (a + b).to_string(),
        hint: "Add the two numbers together.".to_string(),
    }
}

fn subtraction(shape: Shape, blueprint: &CrimeBlueprint, rng: &mut impl Rng) -> Draft {
    let max = shape.magnitude();
    let a = rng.gen_range(2..=max);
    let b = rng.gen_range(1..a);
    let place = blueprint.steps[blueprint.steps.len() - 1].location.as_str();
    Draft {
        question: format!(
            "There were {a} stickers on the noticeboard in the {place}. Now there are {b}. How many stickers went missing?"
        ),
        answer: (a - b).to_string(),
        hint: "Take the smaller number away from the bigger one.".to_string(),
    }
}

fn multiplication(shape: Shape, rng: &mut impl Rng) -> Draft {
    let top = (5 + shape.year + shape.level).min(12);
    let a = rng.gen_range(2..=top);
    let b = rng.gen_range(2..=top);
    Draft {
        question: format!(
            "Each evidence box holds {a} clue cards. The detectives filled {b} boxes. How many clue cards are there?"
        ),
        answer: (a * b).to_string(),
        hint: format!("Think of the {a} times table."),
    }
}

fn division(shape: Shape, rng: &mut impl Rng) -> Draft {
    let divisor = rng.gen_range(2..=(5 + shape.level * 2).min(12));
    let quotient = rng.gen_range(2..=(3 + shape.year * 2));
    if shape.level == 1 {
        let total = divisor * quotient;
        Draft {
            question: format!(
                "{total} magnifying glasses are shared equally among {divisor} detective teams. How many does each team get?"
            ),
            answer: quotient.to_string(),
            hint: format!("How many groups of {divisor} make {total}?"),
        }
    } else {
        let remainder = rng.gen_range(1..divisor);
        let total = divisor * quotient + remainder;
        Draft {
            question: format!(
                "{total} sweets are packed into bags of {divisor}. How many full bags are there, and how many sweets are left over? Answer like \"5 remainder 2\"."
            ),
            answer: format!("{quotient} remainder {remainder}"),
            hint: "Divide, then check what is left.".to_string(),
        }
    }
}

/// Uses the blueprint's own step times so the answer agrees with the story.
fn elapsed_time(blueprint: &CrimeBlueprint, rng: &mut impl Rng) -> Draft {
    let last = blueprint.steps.len() - 1;
    let i = rng.gen_range(0..last);
    let j = rng.gen_range(i + 1..=last);
    let (from, to) = (&blueprint.steps[i], &blueprint.steps[j]);
    Draft {
        question: format!(
            "One clue was left at {} in the {}. Another was left at {} in the {}. How many minutes apart were they?",
            from.at, from.location, to.at, to.location
        ),
        answer: (to.at.minutes() - from.at.minutes()).to_string(),
        hint: "Count on from the earlier time to the later one.".to_string(),
    }
}

fn number_pattern(shape: Shape, rng: &mut impl Rng) -> Draft {
    let len = 4 + shape.level as usize;
    let terms: Vec<u32> = if shape.level >= 3 && shape.year >= 4 {
        let start = rng.gen_range(1..=5);
        (0..len as u32).map(|k| start * 2u32.pow(k)).collect()
    } else {
        let start = rng.gen_range(1..=20);
        let step = rng.gen_range(2..=(2 + shape.year * 2));
        (0..len as u32).map(|k| start + step * k).collect()
    };
    let (shown, next) = terms.split_at(len - 1);
    let shown: Vec<String> = shown.iter().map(u32::to_string).collect();
    Draft {
        question: format!(
            "The locker code follows a pattern: {}, ... What number comes next?",
            shown.join(", ")
        ),
        answer: next[0].to_string(),
        hint: "Look at how each number changes from the one before.".to_string(),
    }
}

const CIPHER_WORDS: &[&str] = &["CLUE", "ALIBI", "LADDER", "GLOVES", "LOCKER", "WITNESS", "FOOTPRINT"];

fn caesar(shape: Shape, blueprint: &CrimeBlueprint, rng: &mut impl Rng) -> Draft {
    let word = match location_word(blueprint, rng) {
        Some(word) if rng.gen_bool(0.5) => word,
        _ => CIPHER_WORDS.choose(rng).copied().unwrap_or("CLUE").to_string(),
    };
    let shift = rng.gen_range(1..=(shape.level + 2)) as u8;
    let coded: String = word
        .chars()
        .map(|c| (b'A' + (c as u8 - b'A' + shift) % 26) as char)
        .collect();
    Draft {
        question: format!(
            "A note says \"{coded}\". Every letter was moved {shift} places forward in the alphabet. What does it really say?"
        ),
        answer: word,
        hint: format!("Move each letter {shift} places back."),
    }
}

fn anagram(blueprint: &CrimeBlueprint, rng: &mut impl Rng) -> Draft {
    let word = location_word(blueprint, rng).unwrap_or_else(|| "CLUE".to_string());
    let mut letters: Vec<char> = word.chars().collect();
    letters.shuffle(rng);
    if letters.iter().collect::<String>() == word {
        letters.rotate_left(1);
    }
    let jumbled: String = letters.into_iter().collect();
    Draft {
        question: format!(
            "Unscramble the letters {jumbled} to find a place the culprit visited."
        ),
        answer: word,
        hint: "It is one of the places in this case.".to_string(),
    }
}

/// An upper-case, letters-only word (4+ letters) from a step location.
fn location_word(blueprint: &CrimeBlueprint, rng: &mut impl Rng) -> Option<String> {
    let words: Vec<String> = blueprint
        .steps
        .iter()
        .flat_map(|s| s.location.split_whitespace())
        .filter(|w| w.len() >= 4 && w.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|w| w.to_ascii_uppercase())
        .collect();
    words.choose(rng).cloned()
}

const MATTER: &[(&str, &str)] = &[
    ("ice cube", "solid"),
    ("orange juice", "liquid"),
    ("steam from the kettle", "gas"),
    ("pencil", "solid"),
    ("glue", "liquid"),
    ("air in a balloon", "gas"),
    ("marble", "solid"),
    ("milk", "liquid"),
];

fn states_of_matter(rng: &mut impl Rng) -> Draft {
    let (thing, state) = MATTER.choose(rng).copied().unwrap_or(("ice cube", "solid"));
    Draft {
        question: format!(
            "A clue was found next to some {thing}. Is {thing} a solid, a liquid or a gas?"
        ),
        answer: state.to_string(),
        hint: "Does it keep its shape, take the shape of its container, or spread out to fill the room?"
            .to_string(),
    }
}

const FOOD_CHAINS: &[[&str; 4]] = &[
    ["grass", "grasshopper", "frog", "snake"],
    ["leaves", "caterpillar", "bird", "cat"],
    ["algae", "tadpole", "fish", "heron"],
    ["seeds", "mouse", "owl", "fox"],
];

fn food_chain(rng: &mut impl Rng) -> Draft {
    let chain = FOOD_CHAINS.choose(rng).copied().unwrap_or(FOOD_CHAINS[0]);
    let gap = rng.gen_range(1..chain.len());
    let shown: Vec<&str> = chain
        .iter()
        .enumerate()
        .map(|(i, link)| if i == gap { "?" } else { link })
        .collect();
    Draft {
        question: format!(
            "The school garden poster shows a food chain: {}. Which living thing is missing?",
            shown.join(" -> ")
        ),
        answer: chain[gap].to_string(),
        hint: "Each living thing is eaten by the next one in the chain.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::model::{CrimeKind, CrimeStep, TimePoint, TimeWindow};

    #[test]
    fn caesar_answer_decodes_question() {
        let blueprint = CrimeBlueprint {
            template_id: "t".into(),
            kind: CrimeKind::Theft,
            title: "t".into(),
            target: "t".into(),
            steps: vec![CrimeStep {
                index: 0,
                at: TimePoint(30),
                description: "d".into(),
                location: "Trophy Hall".into(),
            }],
            traces: vec![],
            crime_window: TimeWindow::from_minutes(30, 31),
        };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let d = caesar(Shape { level: 2, year: 4 }, &blueprint, &mut rng);
            assert!(d.answer.chars().all(|c| c.is_ascii_uppercase()));
            assert!(!d.question.contains(&format!("\"{}\"", d.answer)));
        }
    }

    #[test]
    fn division_with_remainder_is_consistent() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..20 {
            let d = division(Shape { level: 2, year: 5 }, &mut rng);
            let parts: Vec<u32> = d
                .answer
                .split(" remainder ")
                .map(|p| p.parse().unwrap())
                .collect();
            assert_eq!(parts.len(), 2);
            let total: u32 = d.question.split_whitespace().next().unwrap().parse().unwrap();
            let divisor: u32 = d
                .question
                .split("bags of ")
                .nth(1)
                .unwrap()
                .split('.')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            assert_eq!(parts[0] * divisor + parts[1], total);
            assert!(parts[1] < divisor);
        }
    }

    #[test]
    fn number_pattern_answer_continues_sequence() {
        let mut rng = StdRng::seed_from_u64(13);
        let d = number_pattern(Shape { level: 1, year: 2 }, &mut rng);
        let shown: Vec<u32> = d
            .question
            .split(": ")
            .nth(1)
            .unwrap()
            .trim_end_matches(", ... What number comes next?")
            .split(", ")
            .map(|n| n.parse().unwrap())
            .collect();
        let step = shown[1] - shown[0];
        let answer: u32 = d.answer.parse().unwrap();
        assert_eq!(answer, shown[shown.len() - 1] + step);
    }
}
