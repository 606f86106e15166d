//! Narrative phase. Every sentence is built from facts already in the
//! context, so the prose cannot contradict the logic.

use super::{ContextSlot, GenerationContext, GenerationPhase};
use crate::error::{Error, Result};
use crate::model::{
    CrimeBlueprint, CrimeKind, NarrativeLayer, SceneCaption, SceneKind, SuspectIntro,
    SuspectProfile,
};

pub struct NarrativePhase;

impl GenerationPhase for NarrativePhase {
    fn name(&self) -> &'static str {
        "narrative"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Narrative
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<()> {
        let blueprint = ctx.blueprint()?;
        let suspects = ctx.suspects()?;
        let determination = ctx.determination()?;
        let scenes = ctx.scenes()?;

        let culprit = suspects
            .iter()
            .find(|s| s.id == determination.culprit_id)
            .ok_or_else(|| Error::Phase {
                phase: "narrative".to_string(),
                message: format!("culprit {} is not a suspect", determination.culprit_id),
            })?;

        let suspect_intros = suspects
            .iter()
            .map(|s| SuspectIntro {
                suspect_id: s.id,
                text: introduce(s),
            })
            .collect();

        let scene_captions = scenes
            .iter()
            .map(|scene| SceneCaption {
                scene_id: scene.id.clone(),
                caption: match scene.kind {
                    SceneKind::Briefing => "Listen carefully. Every detail matters.".to_string(),
                    SceneKind::CrimeScene => format!(
                        "Look closely around the {}. {} clue{} waiting.",
                        scene.location,
                        scene.evidence_ids.len(),
                        if scene.evidence_ids.len() == 1 { " is" } else { "s are" }
                    ),
                    SceneKind::Interview => {
                        "Ask each suspect where they were. Whose story has a gap?".to_string()
                    }
                },
            })
            .collect();

        let narrative = NarrativeLayer {
            title: blueprint.title.clone(),
            briefing: briefing(blueprint, suspects.len()),
            suspect_intros,
            scene_captions,
            solution: format!(
                "{} was responsible. {} {}",
                culprit.name,
                determination.rationale,
                retrace(blueprint)
            ),
            epilogue: epilogue(blueprint.kind, culprit, &blueprint.target),
            teaser: None,
        };

        ctx.narrative = Some(narrative);
        Ok(())
    }
}

fn briefing(blueprint: &CrimeBlueprint, suspect_count: usize) -> String {
    let what = match blueprint.kind {
        CrimeKind::Theft => format!("{} has gone missing", blueprint.target),
        CrimeKind::Vandalism => format!("someone has made a mess of {}", blueprint.target),
        CrimeKind::Sabotage => format!("someone has tampered with {}", blueprint.target),
        CrimeKind::Forgery => format!("someone has changed {}", blueprint.target),
    };
    format!(
        "Detectives, we need your help! Between {} and {}, {what}. \
         {suspect_count} people were around the school at the time. \
         Solve the puzzles to unlock clues and work out who did it.",
        blueprint.crime_window.start(),
        blueprint.crime_window.end(),
    )
}

fn introduce(suspect: &SuspectProfile) -> String {
    let traits = match suspect.personality.as_slice() {
        [] => String::new(),
        [only] => format!(" They are {only}."),
        [first, rest @ ..] => format!(" They are {first} and {}.", rest.join(", ")),
    };
    format!("{}, the {}.{traits}", suspect.name, suspect.role.to_lowercase())
}

fn retrace(blueprint: &CrimeBlueprint) -> String {
    let steps: Vec<String> = blueprint
        .steps
        .iter()
        .map(|s| format!("At {} in the {}: {}.", s.at, s.location, s.description.trim_end_matches('.')))
        .collect();
    format!("Here is what happened. {}", steps.join(" "))
}

fn epilogue(kind: CrimeKind, culprit: &SuspectProfile, target: &str) -> String {
    let amends = match kind {
        CrimeKind::Theft => format!("returned {target} and apologised to the whole school"),
        CrimeKind::Vandalism => format!("spent a week helping to tidy up {target}"),
        CrimeKind::Sabotage => format!("helped to repair {target} and promised to ask for help next time"),
        CrimeKind::Forgery => format!("put {target} back the way it was and told the truth"),
    };
    format!(
        "{} {amends}. Thanks to your careful detective work, the school is calm again.",
        culprit.name
    )
}
