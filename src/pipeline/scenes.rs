//! Scene phase: briefing, one crime scene per trace location, interviews.

use super::{ContextSlot, GenerationContext, GenerationPhase};
use crate::error::Result;
use crate::model::{AssetKind, AssetSpec, EvidenceType, Relevance, Scene, SceneKind, SuspectId};

const BRIEFING_ROOM: &str = "Principal's Office";
const INTERVIEW_ROOM: &str = "Meeting Room";

pub struct ScenePhase;

impl GenerationPhase for ScenePhase {
    fn name(&self) -> &'static str {
        "scenes"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Scenes
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<()> {
        let blueprint = ctx.blueprint()?;
        let suspects = ctx.suspects()?;
        let evidence = ctx.evidence()?;
        let everyone: Vec<SuspectId> = suspects.iter().map(|s| s.id).collect();

        let mut scenes = Vec::new();
        let mut add = |kind: SceneKind,
                       title: String,
                       location: &str,
                       description: String,
                       suspect_ids: Vec<SuspectId>,
                       evidence_ids: Vec<String>| {
            let id = format!("SC{}", scenes.len() + 1);
            let backdrop = AssetSpec::new(
                AssetKind::Backdrop,
                format!(
                    "Bright storybook illustration of a primary school {}, {}",
                    location.to_lowercase(),
                    mood(kind)
                ),
            )
            .meta("scene_id", id.clone())
            .meta("location", location);
            scenes.push(Scene {
                id,
                kind,
                title,
                location: location.to_string(),
                description,
                suspect_ids,
                evidence_ids,
                backdrop,
            });
        };

        add(
            SceneKind::Briefing,
            "The Case Begins".to_string(),
            BRIEFING_ROOM,
            format!(
                "The principal explains that {} went wrong between {} and {}.",
                blueprint.target,
                blueprint.crime_window.start(),
                blueprint.crime_window.end()
            ),
            everyone.clone(),
            Vec::new(),
        );

        for location in blueprint.trace_locations() {
            let evidence_ids: Vec<String> = evidence
                .iter()
                .filter(|e| {
                    e.linked_trace_id
                        .as_deref()
                        .and_then(|t| blueprint.trace(t))
                        .is_some_and(|t| t.location == location)
                })
                .map(|e| e.id.clone())
                .collect();
            let with_access: Vec<SuspectId> = suspects
                .iter()
                .filter(|s| s.has_access_to(location))
                .map(|s| s.id)
                .collect();
            add(
                SceneKind::CrimeScene,
                format!("Searching the {location}"),
                location,
                format!(
                    "Something happened in the {location}. There are {} clues to examine here.",
                    evidence_ids.len()
                ),
                with_access,
                evidence_ids,
            );
        }

        let statements: Vec<String> = evidence
            .iter()
            .filter(|e| e.evidence_type == EvidenceType::Testimony && e.relevance != Relevance::RedHerring)
            .map(|e| e.id.clone())
            .collect();
        add(
            SceneKind::Interview,
            "Questioning the Suspects".to_string(),
            INTERVIEW_ROOM,
            format!(
                "{} suspects wait to be asked where they were.",
                everyone.len()
            ),
            everyone,
            statements,
        );

        ctx.scenes = Some(scenes);
        Ok(())
    }
}

fn mood(kind: SceneKind) -> &'static str {
    match kind {
        SceneKind::Briefing => "calm morning light",
        SceneKind::CrimeScene => "mysterious, with a magnifying glass in the foreground",
        SceneKind::Interview => "warm and welcoming, chairs in a circle",
    }
}
