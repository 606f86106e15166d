//! Integration tests for the generation pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use casegen::config::{GenerationPolicy, QualityThresholds};
use casegen::curriculum::StaticCurriculum;
use casegen::error::Error;
use casegen::model::*;
use casegen::pipeline::{
    CaseGenerator, ContextSlot, GenerationContext, GenerationPhase, PhaseProgress,
    PipelineExecutor,
};
use casegen::templates::TemplateCatalog;
use casegen::validate::QualityValidator;

fn generator() -> CaseGenerator {
    CaseGenerator::builtin(&GenerationPolicy::default()).unwrap()
}

fn scenario_a() -> GenerationRequest {
    GenerationRequest::new(
        Difficulty::Rookie,
        Subject::Math,
        GradeLevel::P4,
        PuzzleComplexity::Basic,
    )
    .suspect_count(3)
}

fn assert_fair(case: &MysteryCase) {
    let guilty: Vec<_> = case.suspects.iter().filter(|s| s.is_guilty).collect();
    assert_eq!(guilty.len(), 1, "seed {}", case.seed);
    assert_eq!(guilty[0].id, case.determination.culprit_id);
    assert!(case.determination.opportunity_score > 0.0);

    assert!(case.puzzles.len() >= 3);
    for p in &case.puzzles {
        assert!(!p.question.trim().is_empty());
        assert!(!p.answer.trim().is_empty());
        assert!(p.check(&p.answer));
    }
    assert!(case.scenes.len() >= 2);

    let culprit = case.determination.culprit_id;
    assert!(case.evidence_with(Relevance::Critical).count() >= 2);
    assert!(case.evidence_with(Relevance::Critical).all(|e| e.links(culprit)));
    assert!(case.evidence_with(Relevance::RedHerring).all(|e| !e.links(culprit)));

    let violations = QualityValidator::new(QualityThresholds::default()).check(case);
    assert!(violations.is_empty(), "seed {}: {violations:?}", case.seed);
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_rookie_math_p4_is_fair_across_seeds() {
    let generator = generator();
    for seed in 0..60 {
        let case = generator.generate(&scenario_a(), seed).unwrap();
        assert_eq!(case.suspects.len(), 3);
        assert_eq!(case.blueprint.steps.len(), Difficulty::Rookie.step_count());
        assert_fair(&case);
    }
}

#[test]
fn every_supported_request_shape_generates_a_fair_case() {
    let generator = generator();
    let difficulties = [
        Difficulty::Rookie,
        Difficulty::Inspector,
        Difficulty::Detective,
        Difficulty::Chief,
    ];
    let subjects = [Subject::Math, Subject::Science, Subject::English];
    let grades = [
        GradeLevel::P1,
        GradeLevel::P2,
        GradeLevel::P3,
        GradeLevel::P4,
        GradeLevel::P5,
        GradeLevel::P6,
    ];
    let complexities = [
        PuzzleComplexity::Basic,
        PuzzleComplexity::Standard,
        PuzzleComplexity::Challenging,
    ];

    let mut seed = 1000;
    for difficulty in difficulties {
        for subject in subjects {
            for grade in grades {
                for complexity in complexities {
                    seed += 1;
                    let request = GenerationRequest::new(difficulty, subject, grade, complexity);
                    let case = generator.generate(&request, seed).unwrap();
                    assert_eq!(case.suspects.len(), difficulty.suspect_count());
                    assert_eq!(case.puzzles.len(), complexity.puzzle_count());
                    assert_fair(&case);
                }
            }
        }
    }
}

#[test]
fn same_seed_reproduces_the_case() {
    let generator = generator();
    let a = generator.generate(&scenario_a(), 42).unwrap();
    let b = generator.generate(&scenario_a(), 42).unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(a.blueprint, b.blueprint);
    assert_eq!(a.suspects, b.suspects);
    assert_eq!(a.determination, b.determination);
    assert_eq!(a.puzzles, b.puzzles);
    assert_eq!(
        CaseFingerprint::compute(&a).combined_hash,
        CaseFingerprint::compute(&b).combined_hash
    );
}

#[test]
fn scenario_b_different_seeds_give_different_cases() {
    let generator = generator();
    let a = generator.generate(&scenario_a(), 7).unwrap();
    let b = generator.generate(&scenario_a(), 8).unwrap();
    assert_fair(&a);
    assert_fair(&b);
    assert_ne!(
        CaseFingerprint::compute(&a).combined_hash,
        CaseFingerprint::compute(&b).combined_hash
    );
}

#[test]
fn scenario_d_unmatched_request_is_a_template_mismatch() {
    let request = GenerationRequest::new(
        Difficulty::Rookie,
        Subject::Science,
        GradeLevel::P3,
        PuzzleComplexity::Basic,
    )
    .crime_kind(CrimeKind::Forgery);
    let err = generator().generate(&request, 1).unwrap_err();
    assert!(matches!(err, Error::TemplateMismatch(_)), "{err}");
    assert!(!err.is_retryable());
}

#[test]
fn crime_kind_constraint_is_honored() {
    let generator = generator();
    let request = GenerationRequest::new(
        Difficulty::Detective,
        Subject::English,
        GradeLevel::P5,
        PuzzleComplexity::Standard,
    )
    .crime_kind(CrimeKind::Forgery);
    for seed in 0..10 {
        let case = generator.generate(&request, seed).unwrap();
        assert_eq!(case.blueprint.kind, CrimeKind::Forgery);
        assert_fair(&case);
    }
}

#[test]
fn guilt_appears_only_on_the_assembled_case() {
    let case = generator().generate(&scenario_a(), 11).unwrap();
    for suspect in &case.suspects {
        let profile = serde_json::to_value(&suspect.profile).unwrap();
        assert!(profile.get("is_guilty").is_none());

        let flat = serde_json::to_value(suspect).unwrap();
        assert_eq!(flat["is_guilty"], suspect.id == case.determination.culprit_id);
        assert_eq!(flat["name"], suspect.name.as_str());
    }

    let json = serde_json::to_value(&case).unwrap();
    let back: MysteryCase = serde_json::from_value(json).unwrap();
    assert_eq!(back.suspects, case.suspects);
}

#[test]
fn excluded_roles_never_appear() {
    let generator = generator();
    let request = scenario_a().exclude_role("Janitor").exclude_role("Librarian");
    for seed in 0..20 {
        let case = generator.generate(&request, seed).unwrap();
        assert!(
            case.suspects
                .iter()
                .all(|s| s.role != "Janitor" && s.role != "Librarian")
        );
    }
}

#[test]
fn empty_curriculum_fails_the_run() {
    let generator = CaseGenerator::standard(
        Arc::new(TemplateCatalog::builtin().unwrap()),
        Arc::new(StaticCurriculum::empty()),
        &GenerationPolicy::default(),
    )
    .unwrap();
    let err = generator.generate(&scenario_a(), 3).unwrap_err();
    assert!(matches!(err, Error::NoCurriculumTopics(_)), "{err}");
}

#[test]
fn puzzles_are_tagged_and_unlock_real_evidence() {
    let case = generator()
        .generate(
            &GenerationRequest::new(
                Difficulty::Inspector,
                Subject::Science,
                GradeLevel::P2,
                PuzzleComplexity::Challenging,
            ),
            11,
        )
        .unwrap();
    for puzzle in &case.puzzles {
        assert!(!puzzle.topic.code.is_empty());
        let unlocked = puzzle.unlocks_evidence.as_deref().unwrap();
        let item = case.evidence.iter().find(|e| e.id == unlocked).unwrap();
        assert_ne!(item.relevance, Relevance::RedHerring);
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

struct Named(&'static str);

impl GenerationPhase for Named {
    fn name(&self) -> &'static str {
        self.0
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Extension(self.0.to_string())
    }

    fn run(&self, ctx: &mut GenerationContext) -> casegen::error::Result<()> {
        ctx.extensions
            .insert(self.0.to_string(), serde_json::json!(true));
        Ok(())
    }
}

struct Lazy;

impl GenerationPhase for Lazy {
    fn name(&self) -> &'static str {
        "lazy"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Blueprint
    }

    fn run(&self, _ctx: &mut GenerationContext) -> casegen::error::Result<()> {
        Ok(())
    }
}

struct Broken;

impl GenerationPhase for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Blueprint
    }

    fn run(&self, _ctx: &mut GenerationContext) -> casegen::error::Result<()> {
        Err(Error::ImpossibleCulprit("test".into()))
    }
}

struct Flag(Arc<AtomicBool>);

impl GenerationPhase for Flag {
    fn name(&self) -> &'static str {
        "flag"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Extension("flag".into())
    }

    fn run(&self, ctx: &mut GenerationContext) -> casegen::error::Result<()> {
        self.0.store(true, Ordering::SeqCst);
        ctx.extensions.insert("flag".into(), serde_json::json!(1));
        Ok(())
    }
}

#[test]
fn executor_rejects_duplicate_phase_names() {
    let result = PipelineExecutor::new()
        .with_phase(Named("a"))
        .unwrap()
        .with_phase(Named("a"));
    assert!(matches!(result, Err(Error::Phase { .. })));
}

#[test]
fn executor_runs_phases_in_order_and_reports_progress() {
    let executor = PipelineExecutor::new()
        .with_phase(Named("first"))
        .unwrap()
        .with_phase(Named("second"))
        .unwrap();
    assert_eq!(executor.phase_names(), vec!["first", "second"]);

    let mut seen = Vec::new();
    let ctx = executor
        .execute(GenerationContext::new(scenario_a(), 1), &mut |p| seen.push(p))
        .unwrap();
    assert_eq!(ctx.extensions.len(), 2);
    assert_eq!(
        seen,
        vec![
            PhaseProgress {
                phase: "first",
                completed: 1,
                total: 2
            },
            PhaseProgress {
                phase: "second",
                completed: 2,
                total: 2
            },
        ]
    );
    assert_eq!(seen[0].scaled(5, 80), 42);
    assert_eq!(seen[1].scaled(5, 80), 80);
}

#[test]
fn executor_aborts_when_a_phase_leaves_its_slot_empty() {
    let executor = PipelineExecutor::new().with_phase(Lazy).unwrap();
    let err = executor
        .execute(GenerationContext::new(scenario_a(), 1), &mut |_| {})
        .err()
        .unwrap();
    assert!(matches!(err, Error::Phase { ref phase, .. } if phase == "lazy"));
}

#[test]
fn executor_stops_at_the_first_failing_phase() {
    let ran = Arc::new(AtomicBool::new(false));
    let executor = PipelineExecutor::new()
        .with_phase(Broken)
        .unwrap()
        .with_phase(Flag(ran.clone()))
        .unwrap();
    let err = executor
        .execute(GenerationContext::new(scenario_a(), 1), &mut |_| {})
        .err()
        .unwrap();
    assert!(matches!(err, Error::ImpossibleCulprit(_)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn standard_generator_has_seven_phases() {
    assert_eq!(
        generator().executor().phase_names(),
        vec![
            "blueprint",
            "suspects",
            "culprit",
            "evidence",
            "scenes",
            "puzzles",
            "narrative"
        ]
    );
}
