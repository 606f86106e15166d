//! The generation pipeline.
//!
//! A run is an explicit, ordered list of [`GenerationPhase`]s over one
//! [`GenerationContext`]. Each phase reads what earlier phases produced and
//! fills exactly one [`ContextSlot`]. Phases are pure: no I/O, and all
//! randomness comes from the context's seeded RNG, so a seed reproduces a
//! case exactly.
//!
//! New behavior is added by implementing [`GenerationPhase`] and appending
//! it with [`PipelineExecutor::with_phase`]; the executor itself never
//! changes.

pub mod blueprint;
pub mod context;
pub mod culprit;
pub mod evidence;
pub mod narrative;
pub mod puzzles;
pub mod scenes;
pub mod suspects;

pub use context::{ContextSlot, GenerationContext};

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::config::GenerationPolicy;
use crate::curriculum::{StaticCurriculum, TopicSelector};
use crate::error::{Error, Result};
use crate::model::{GenerationRequest, MysteryCase};
use crate::telemetry::{job as job_telemetry, metrics};
use crate::templates::TemplateCatalog;

/// One step of a generation run.
pub trait GenerationPhase: Send + Sync {
    /// Stable, unique name within a pipeline.
    fn name(&self) -> &'static str;

    /// The context field this phase fills.
    fn output(&self) -> ContextSlot;

    fn run(&self, ctx: &mut GenerationContext) -> Result<()>;
}

/// Reported after each phase completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseProgress {
    pub phase: &'static str,
    pub completed: usize,
    pub total: usize,
}

impl PhaseProgress {
    /// Completed fraction mapped onto `[from, to]`.
    pub fn scaled(&self, from: u8, to: u8) -> u8 {
        let span = u32::from(to.saturating_sub(from));
        let done = span * self.completed as u32 / self.total.max(1) as u32;
        from + done as u8
    }
}

#[derive(Default)]
pub struct PipelineExecutor {
    phases: Vec<Box<dyn GenerationPhase>>,
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a phase. Names must be unique.
    pub fn with_phase(mut self, phase: impl GenerationPhase + 'static) -> Result<Self> {
        if self.phases.iter().any(|p| p.name() == phase.name()) {
            return Err(Error::Phase {
                phase: phase.name().to_string(),
                message: "a phase with this name is already registered".to_string(),
            });
        }
        self.phases.push(Box::new(phase));
        Ok(self)
    }

    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Run every phase once, in order.
    ///
    /// The first failure aborts the run and the context is dropped with it.
    pub fn execute(
        &self,
        mut ctx: GenerationContext,
        progress: &mut dyn FnMut(PhaseProgress),
    ) -> Result<GenerationContext> {
        let total = self.phases.len();
        for (i, phase) in self.phases.iter().enumerate() {
            let name = phase.name();
            let span = job_telemetry::start_phase_span(name, ctx.seed);
            let _enter = span.enter();
            let started = Instant::now();

            if let Err(e) = phase.run(&mut ctx) {
                warn!(phase = name, error = %e, "phase failed, aborting run");
                return Err(e);
            }
            let slot = phase.output();
            if !ctx.is_filled(&slot) {
                return Err(Error::Phase {
                    phase: name.to_string(),
                    message: format!("finished without producing {slot}"),
                });
            }

            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            metrics::phase_duration_ms().record(elapsed_ms, &[KeyValue::new("phase", name)]);
            debug!(phase = name, elapsed_ms, "phase complete");

            progress(PhaseProgress {
                phase: name,
                completed: i + 1,
                total,
            });
        }
        Ok(ctx)
    }
}

/// Request in, finished case out.
pub struct CaseGenerator {
    executor: PipelineExecutor,
}

impl CaseGenerator {
    /// The seven built-in phases, in dependency order.
    pub fn standard(
        catalog: Arc<TemplateCatalog>,
        curriculum: Arc<dyn TopicSelector>,
        policy: &GenerationPolicy,
    ) -> Result<Self> {
        let executor = PipelineExecutor::new()
            .with_phase(blueprint::BlueprintPhase::new(catalog.clone()))?
            .with_phase(suspects::SuspectPhase::new(catalog))?
            .with_phase(culprit::CulpritPhase::new(policy.weights))?
            .with_phase(evidence::EvidencePhase)?
            .with_phase(scenes::ScenePhase)?
            .with_phase(puzzles::PuzzlePhase::new(curriculum))?
            .with_phase(narrative::NarrativePhase)?;
        Ok(Self { executor })
    }

    /// Standard pipeline over the built-in case book and curriculum.
    pub fn builtin(policy: &GenerationPolicy) -> Result<Self> {
        Self::standard(
            Arc::new(TemplateCatalog::builtin()?),
            Arc::new(StaticCurriculum::builtin()?),
            policy,
        )
    }

    pub fn from_executor(executor: PipelineExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    pub fn generate(&self, request: &GenerationRequest, seed: u64) -> Result<MysteryCase> {
        self.generate_with_progress(request, seed, &mut |_| {})
    }

    pub fn generate_with_progress(
        &self,
        request: &GenerationRequest,
        seed: u64,
        progress: &mut dyn FnMut(PhaseProgress),
    ) -> Result<MysteryCase> {
        request.validate()?;
        let ctx = GenerationContext::new(request.clone(), seed);
        self.executor.execute(ctx, progress)?.into_case()
    }
}
