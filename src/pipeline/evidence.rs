//! Evidence phase.
//!
//! Critical items always name the culprit; red herrings never do.

use rand::seq::SliceRandom;

use super::{ContextSlot, GenerationContext, GenerationPhase};
use crate::error::Result;
use crate::model::{
    CrimeBlueprint, CulpritDetermination, EvidenceItem, EvidenceType, MovementKind, RelationKind,
    Relevance, SuspectId, SuspectProfile, TimeWindow, covered_minutes,
};
use crate::templates::RedHerringTemplate;

pub struct EvidencePhase;

impl GenerationPhase for EvidencePhase {
    fn name(&self) -> &'static str {
        "evidence"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Evidence
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<()> {
        let mut herrings: Vec<RedHerringTemplate> = ctx.template()?.red_herrings.clone();
        herrings.shuffle(&mut ctx.rng);

        let blueprint = ctx.blueprint()?;
        let suspects = ctx.suspects()?;
        let determination = ctx.determination()?;

        let mut builder = EvidenceBuilder::default();
        trace_evidence(&mut builder, blueprint, suspects, determination);
        culprit_evidence(&mut builder, blueprint, suspects, determination);
        alibi_confirmations(&mut builder, blueprint, suspects, determination);
        red_herrings(&mut builder, &herrings, suspects, determination);

        ctx.evidence = Some(builder.items);
        Ok(())
    }
}

#[derive(Default)]
struct EvidenceBuilder {
    items: Vec<EvidenceItem>,
}

impl EvidenceBuilder {
    fn push(
        &mut self,
        evidence_type: EvidenceType,
        relevance: Relevance,
        title: impl Into<String>,
        description: impl Into<String>,
        linked_suspect_ids: Vec<SuspectId>,
        linked_trace_id: Option<String>,
    ) {
        self.items.push(EvidenceItem {
            id: format!("E{}", self.items.len() + 1),
            evidence_type,
            relevance,
            title: title.into(),
            description: description.into(),
            linked_suspect_ids,
            linked_trace_id,
        });
    }
}

/// One item per trace. Critical when only the culprit fits the signature,
/// supporting when the culprit and others do. A trace the culprit's
/// attributes do not explain links nobody.
fn trace_evidence(
    b: &mut EvidenceBuilder,
    blueprint: &CrimeBlueprint,
    suspects: &[SuspectProfile],
    determination: &CulpritDetermination,
) {
    let culprit = determination.culprit_id;
    for trace in &blueprint.traces {
        let fits: Vec<SuspectId> = suspects
            .iter()
            .filter(|s| trace.signature.is_consistent_with(&s.attributes))
            .map(|s| s.id)
            .collect();
        let (relevance, links) = if !fits.contains(&culprit) {
            (Relevance::Supporting, Vec::new())
        } else if fits.len() == 1 {
            (Relevance::Critical, fits)
        } else {
            (Relevance::Supporting, fits)
        };
        b.push(
            trace.signature.evidence_type,
            relevance,
            format!("Clue at the {}", trace.location),
            trace.signature.description.clone(),
            links,
            Some(trace.id.clone()),
        );
    }
}

/// The culprit's unaccounted time and motive, both critical.
fn culprit_evidence(
    b: &mut EvidenceBuilder,
    blueprint: &CrimeBlueprint,
    suspects: &[SuspectProfile],
    determination: &CulpritDetermination,
) {
    let Some(culprit) = suspects.iter().find(|s| s.id == determination.culprit_id) else {
        return;
    };
    let window = blueprint.crime_window;

    let claimed = culprit
        .movements
        .iter()
        .find(|m| m.kind == MovementKind::Claimed && m.window.overlaps(&window));
    let gap = unaccounted_minutes(culprit, window);
    let testimony = match claimed {
        Some(m) => format!(
            "{} says they were in the {} from {} to {}, but nobody saw them there.",
            culprit.name,
            m.location,
            window.start(),
            window.end()
        ),
        None if gap == window.duration() => format!(
            "Nobody can say where {} was between {} and {}.",
            culprit.name,
            window.start(),
            window.end()
        ),
        None => format!(
            "Nobody saw {} for {gap} minutes between {} and {}.",
            culprit.name,
            window.start(),
            window.end()
        ),
    };
    b.push(
        EvidenceType::Testimony,
        Relevance::Critical,
        format!("{}'s missing minutes", culprit.name),
        testimony,
        vec![culprit.id],
        None,
    );

    let motive = if let Some(tie) = &culprit.target_tie {
        format!("A note shows that {} {tie}.", culprit.name)
    } else if let Some(rival) = culprit
        .relationships
        .iter()
        .find(|r| r.kind == RelationKind::Rival)
    {
        let rival_name = suspects
            .iter()
            .find(|s| s.id == rival.other)
            .map(|s| s.name.as_str())
            .unwrap_or("a rival");
        format!(
            "A message shows {} wanted {} to get the blame for anything that went wrong with {}.",
            culprit.name, rival_name, blueprint.target
        )
    } else {
        format!(
            "The {} duty roster shows {} was often near {}.",
            culprit.role.to_lowercase(),
            culprit.name,
            blueprint.target
        )
    };
    b.push(
        EvidenceType::Document,
        Relevance::Critical,
        format!("{}'s motive", culprit.name),
        motive,
        vec![culprit.id],
        None,
    );
}

/// Witness statements clearing suspects with a full alibi.
fn alibi_confirmations(
    b: &mut EvidenceBuilder,
    blueprint: &CrimeBlueprint,
    suspects: &[SuspectProfile],
    determination: &CulpritDetermination,
) {
    let window = blueprint.crime_window;
    for s in suspects.iter().filter(|s| s.id != determination.culprit_id) {
        let Some(alibi) = s
            .witnessed()
            .find(|m| m.window.covers(&window) && !blueprint.is_trace_location(&m.location))
        else {
            continue;
        };
        b.push(
            EvidenceType::Testimony,
            Relevance::Supporting,
            format!("{}'s alibi", s.name),
            format!(
                "Witnesses saw {} in the {} from {} to {}.",
                s.name,
                alibi.location,
                alibi.window.start(),
                alibi.window.end()
            ),
            vec![s.id],
            None,
        );
    }
}

/// A red herring for every innocent suspect who had opportunity; at least
/// one overall.
fn red_herrings(
    b: &mut EvidenceBuilder,
    herrings: &[RedHerringTemplate],
    suspects: &[SuspectProfile],
    determination: &CulpritDetermination,
) {
    let culprit = determination.culprit_id;
    let mut targets: Vec<SuspectId> = determination
        .scorecards
        .iter()
        .filter(|c| c.suspect_id != culprit && c.opportunity > 0.0)
        .map(|c| c.suspect_id)
        .collect();
    if targets.is_empty() {
        // Scorecards are ranked, so this is the strongest innocent suspect.
        targets.extend(
            determination
                .scorecards
                .iter()
                .map(|c| c.suspect_id)
                .find(|id| *id != culprit),
        );
    }

    for (i, id) in targets.into_iter().enumerate() {
        let (Some(template), Some(suspect)) = (
            herrings.get(i % herrings.len().max(1)),
            suspects.iter().find(|s| s.id == id),
        ) else {
            continue;
        };
        b.push(
            template.evidence_type,
            Relevance::RedHerring,
            template.title.clone(),
            template.description.replace("{suspect}", &suspect.name),
            vec![id],
            None,
        );
    }
}

fn unaccounted_minutes(suspect: &SuspectProfile, window: TimeWindow) -> u32 {
    let seen: Vec<TimeWindow> = suspect.witnessed().map(|m| m.window).collect();
    window.duration() - covered_minutes(&window, &seen)
}
