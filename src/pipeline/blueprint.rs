//! Crime Blueprint Builder: pick a template and lay out what happened.

use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::{ContextSlot, GenerationContext, GenerationPhase};
use crate::error::{Error, Result};
use crate::model::{CrimeBlueprint, CrimeStep, PhysicalSignature, TimePoint, TimeWindow, TracePoint};
use crate::templates::{CrimeTemplate, TemplateCatalog};

/// Earliest and latest first-step minute.
const START_RANGE: (u32, u32) = (30, 90);
/// Minutes between consecutive steps.
const GAP_RANGE: (u32, u32) = (4, 18);

pub struct BlueprintPhase {
    catalog: Arc<TemplateCatalog>,
}

impl BlueprintPhase {
    pub fn new(catalog: Arc<TemplateCatalog>) -> Self {
        Self { catalog }
    }
}

impl GenerationPhase for BlueprintPhase {
    fn name(&self) -> &'static str {
        "blueprint"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Blueprint
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<()> {
        let candidates = self.catalog.select(&ctx.request)?;
        let template = *candidates
            .choose(&mut ctx.rng)
            .ok_or_else(|| Error::TemplateMismatch(ctx.request.subject.to_string()))?;

        let wanted = ctx.request.difficulty.step_count();
        let blueprint = instantiate(template, wanted, &mut ctx.rng);
        debug!(
            template = %template.id,
            steps = blueprint.steps.len(),
            window = %blueprint.crime_window,
            "blueprint built"
        );

        ctx.template = Some(template.clone());
        ctx.blueprint = Some(blueprint);
        Ok(())
    }
}

/// Instantiate `template` with `wanted` steps (bounded by its length).
///
/// The first and last template steps are always kept; middle steps are
/// sampled and stay in template order.
fn instantiate(template: &CrimeTemplate, wanted: usize, rng: &mut impl Rng) -> CrimeBlueprint {
    let len = template.steps.len();
    let count = wanted.clamp(2, len);

    let mut middle: Vec<usize> = (1..len - 1).collect();
    middle.shuffle(rng);
    let mut chosen: Vec<usize> = middle.into_iter().take(count - 2).collect();
    chosen.push(0);
    chosen.push(len - 1);
    chosen.sort_unstable();

    let mut at = TimePoint(rng.gen_range(START_RANGE.0..=START_RANGE.1));
    let mut steps = Vec::with_capacity(count);
    let mut traces = Vec::new();
    for (index, &source) in chosen.iter().enumerate() {
        if index > 0 {
            at = at.plus(rng.gen_range(GAP_RANGE.0..=GAP_RANGE.1));
        }
        let step = &template.steps[source];
        steps.push(CrimeStep {
            index,
            at,
            description: step.description.clone(),
            location: step.location.clone(),
        });
        for trace in &step.traces {
            traces.push(TracePoint {
                id: format!("T{}", traces.len() + 1),
                step_index: index,
                location: step.location.clone(),
                signature: PhysicalSignature {
                    evidence_type: trace.evidence_type,
                    description: trace.description.clone(),
                    requires: trace.requires.clone(),
                },
            });
        }
    }

    let first = steps[0].at.minutes();
    let last = steps[steps.len() - 1].at.minutes();
    CrimeBlueprint {
        template_id: template.id.clone(),
        kind: template.kind,
        title: template.title.clone(),
        target: template.target.clone(),
        steps,
        traces,
        crime_window: TimeWindow::from_minutes(first, last + 1),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn keeps_first_and_last_steps_in_order() {
        let catalog = TemplateCatalog::builtin().unwrap();
        let template = catalog.crime("missing-trophy").unwrap();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let bp = instantiate(template, 4, &mut rng);
            assert_eq!(bp.steps.len(), 4);
            assert_eq!(bp.steps[0].description, template.steps[0].description);
            assert_eq!(
                bp.steps[3].description,
                template.steps[template.steps.len() - 1].description
            );
            assert!(bp.steps.windows(2).all(|w| w[0].at < w[1].at));
            assert_eq!(bp.crime_window.start(), bp.steps[0].at);
            assert_eq!(bp.crime_window.end(), bp.steps[3].at.plus(1));
        }
    }

    #[test]
    fn every_step_leaves_a_trace_at_its_location() {
        let catalog = TemplateCatalog::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for template in &catalog.crimes {
            let bp = instantiate(template, 6, &mut rng);
            for step in &bp.steps {
                assert!(
                    bp.traces
                        .iter()
                        .any(|t| t.step_index == step.index && t.location == step.location)
                );
            }
        }
    }
}
