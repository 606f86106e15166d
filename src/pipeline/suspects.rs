//! Suspect Pool Builder.
//!
//! Builds the cast before anyone is guilty. Each suspect is given an
//! exposure class at random: open suspects have no witnessed movement in
//! the crime window, partial ones are seen elsewhere for half of it, and
//! alibied ones are seen elsewhere for all of it. Guilt is decided later,
//! by the culprit phase, from these timelines.

use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::{ContextSlot, GenerationContext, GenerationPhase};
use crate::error::{Error, Result};
use crate::model::{
    AssetKind, AssetSpec, CrimeBlueprint, DialogueNode, MovementKind, RelationKind, Relationship,
    SuspectId, SuspectMovement, SuspectProfile, TimePoint, TimeWindow,
};
use crate::templates::{RoleArchetype, TemplateCatalog};

/// Length of the case day covered by timelines, in minutes.
pub const CASE_SPAN: u32 = 240;
const SEGMENT_RANGE: (u32, u32) = (20, 50);
const EMPTY_SEGMENT_CHANCE: f64 = 0.25;
const ALIBI_PADDING: u32 = 15;
const FEIGNED_ALIBI_CHANCE: f64 = 0.5;
const TARGET_TIE_CHANCE: f64 = 0.5;
const RING_CHANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exposure {
    Open,
    Partial,
    Alibied,
}

pub struct SuspectPhase {
    catalog: Arc<TemplateCatalog>,
}

impl SuspectPhase {
    pub fn new(catalog: Arc<TemplateCatalog>) -> Self {
        Self { catalog }
    }
}

impl GenerationPhase for SuspectPhase {
    fn name(&self) -> &'static str {
        "suspects"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Suspects
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<()> {
        let blueprint = ctx.blueprint()?.clone();
        let ties = ctx.template()?.target_ties.clone();
        let n = ctx.request.suspect_target();
        let open = ctx.request.difficulty.open_suspects();
        let excluded = ctx.request.constraints.excluded_roles.clone();
        let rng = &mut ctx.rng;

        let mut roles: Vec<&RoleArchetype> = self
            .catalog
            .roles
            .iter()
            .filter(|r| !excluded.iter().any(|x| x.eq_ignore_ascii_case(&r.name)))
            .collect();
        if roles.len() < n {
            return Err(Error::InvalidRequest(format!(
                "{n} suspects requested but only {} roles remain after exclusions",
                roles.len()
            )));
        }
        roles.shuffle(rng);
        roles.truncate(n);

        let mut names: Vec<&String> = self.catalog.names.iter().collect();
        names.shuffle(rng);

        let alibi_places: Vec<&str> = self
            .catalog
            .alibi_locations
            .iter()
            .map(String::as_str)
            .filter(|l| !blueprint.is_trace_location(l))
            .collect();
        if alibi_places.is_empty() {
            return Err(Error::Phase {
                phase: self.name().to_string(),
                message: "no alibi location away from the crime".to_string(),
            });
        }

        let mut tie_pool = ties;
        tie_pool.shuffle(rng);

        let classes = exposures(n, open, rng);
        let mut suspects = Vec::with_capacity(n);
        for (i, (role, exposure)) in roles.iter().zip(classes).enumerate() {
            let id = SuspectId(i as u8 + 1);
            let name = names[i].clone();

            let mut roam: Vec<&str> = role.access.iter().map(String::as_str).collect();
            roam.extend(alibi_places.iter().copied());
            roam.sort_unstable();
            roam.dedup();

            let movements = timeline(exposure, blueprint.crime_window, &alibi_places, &roam, rng);
            let personality = personality(role, &self.catalog.personality, rng);
            let target_tie = if !tie_pool.is_empty() && rng.gen_bool(TARGET_TIE_CHANCE) {
                tie_pool.pop()
            } else {
                None
            };
            let portrait = AssetSpec::new(
                AssetKind::Portrait,
                format!(
                    "Friendly storybook portrait of {name}, the school {}, looking {}",
                    role.name.to_lowercase(),
                    personality.first().map(String::as_str).unwrap_or("curious")
                ),
            )
            .meta("suspect_id", id.to_string())
            .meta("role", role.name.clone());

            suspects.push(SuspectProfile {
                id,
                name,
                role: role.name.clone(),
                attributes: role.attributes.clone(),
                access: role.access.clone(),
                personality,
                movements,
                relationships: Vec::new(),
                target_tie,
                dialogue: Vec::new(),
                portrait,
            });
        }

        link_relationships(&mut suspects, rng);
        for i in 0..suspects.len() {
            let nodes = dialogue(&suspects[i], &suspects, &blueprint);
            suspects[i].dialogue = nodes;
        }

        debug!(suspects = suspects.len(), open, "suspect pool built");
        ctx.suspects = Some(suspects);
        Ok(())
    }
}

/// `open` suspects (at least one), the rest split between partial and
/// alibied, in random order.
fn exposures(n: usize, open: usize, rng: &mut impl Rng) -> Vec<Exposure> {
    let open = open.clamp(1, n);
    let mut classes: Vec<Exposure> = (0..n)
        .map(|i| {
            if i < open {
                Exposure::Open
            } else if rng.gen_bool(0.5) {
                Exposure::Partial
            } else {
                Exposure::Alibied
            }
        })
        .collect();
    classes.shuffle(rng);
    classes
}

/// A sorted movement timeline. Witnessed movements never overlap.
fn timeline(
    exposure: Exposure,
    window: TimeWindow,
    alibi_places: &[&str],
    roam: &[&str],
    rng: &mut impl Rng,
) -> Vec<SuspectMovement> {
    let start = window.start().minutes();
    let end = window.end().minutes();

    let mut movements = Vec::new();
    let reserved = match exposure {
        Exposure::Open => {
            if rng.gen_bool(FEIGNED_ALIBI_CHANCE) {
                movements.push(SuspectMovement {
                    window,
                    location: pick(alibi_places, rng),
                    kind: MovementKind::Claimed,
                });
            }
            window
        }
        Exposure::Alibied => {
            let alibi = TimeWindow::from_minutes(
                start.saturating_sub(rng.gen_range(0..=ALIBI_PADDING)),
                end + rng.gen_range(0..=ALIBI_PADDING),
            );
            movements.push(SuspectMovement {
                window: alibi,
                location: pick(alibi_places, rng),
                kind: MovementKind::Witnessed,
            });
            alibi
        }
        Exposure::Partial => {
            let mid = start + window.duration() / 2;
            let alibi = if rng.gen_bool(0.5) {
                TimeWindow::from_minutes(start.saturating_sub(rng.gen_range(0..=ALIBI_PADDING)), mid)
            } else {
                TimeWindow::from_minutes(mid, end + rng.gen_range(0..=ALIBI_PADDING))
            };
            movements.push(SuspectMovement {
                window: alibi,
                location: pick(alibi_places, rng),
                kind: MovementKind::Witnessed,
            });
            TimeWindow::from_minutes(alibi.start().minutes().min(start), alibi.end().minutes().max(end))
        }
    };

    fill(&mut movements, 0, reserved.start().minutes(), roam, rng);
    fill(&mut movements, reserved.end().minutes(), CASE_SPAN, roam, rng);
    movements.sort_by_key(|m| m.window.start());
    movements
}

fn pick(places: &[&str], rng: &mut impl Rng) -> String {
    places.choose(rng).map(|p| p.to_string()).unwrap_or_default()
}

/// Witnessed filler segments over `[from, to)`, some left empty.
fn fill(
    movements: &mut Vec<SuspectMovement>,
    from: u32,
    to: u32,
    roam: &[&str],
    rng: &mut impl Rng,
) {
    let mut t = from;
    while t < to {
        let end = (t + rng.gen_range(SEGMENT_RANGE.0..=SEGMENT_RANGE.1)).min(to);
        if !rng.gen_bool(EMPTY_SEGMENT_CHANCE) {
            if let Some(location) = roam.choose(rng) {
                movements.push(SuspectMovement {
                    window: TimeWindow::from_minutes(t, end),
                    location: location.to_string(),
                    kind: MovementKind::Witnessed,
                });
            }
        }
        t = end;
    }
}

fn personality(role: &RoleArchetype, pool: &[String], rng: &mut impl Rng) -> Vec<String> {
    let mut tags = Vec::with_capacity(2);
    if let Some(tag) = role.personality.choose(rng) {
        tags.push(tag.clone());
    }
    let extra: Vec<&String> = pool.iter().filter(|t| !tags.contains(t)).collect();
    if let Some(tag) = extra.choose(rng) {
        tags.push((*tag).clone());
    }
    tags
}

/// A random path through the suspects, closed into a ring half the time.
/// Every suspect ends up with one or two symmetric links.
fn link_relationships(suspects: &mut [SuspectProfile], rng: &mut impl Rng) {
    let mut order: Vec<usize> = (0..suspects.len()).collect();
    order.shuffle(rng);

    let mut pairs: Vec<(usize, usize)> = order.windows(2).map(|w| (w[0], w[1])).collect();
    if order.len() >= 3 && rng.gen_bool(RING_CHANCE) {
        pairs.push((order[order.len() - 1], order[0]));
    }

    for (a, b) in pairs {
        let kind = *RelationKind::ALL.choose(rng).unwrap_or(&RelationKind::Colleague);
        let (id_a, id_b) = (suspects[a].id, suspects[b].id);
        suspects[a].relationships.push(Relationship { other: id_b, kind });
        suspects[b].relationships.push(Relationship { other: id_a, kind });
    }
    for s in suspects.iter_mut() {
        s.relationships.sort_by_key(|r| r.other);
    }
}

fn dialogue(
    suspect: &SuspectProfile,
    all: &[SuspectProfile],
    blueprint: &CrimeBlueprint,
) -> Vec<DialogueNode> {
    let window = blueprint.crime_window;
    let mut nodes = Vec::new();
    let mut push = |prompt: String, response: String| {
        nodes.push(DialogueNode {
            id: format!("{}-D{}", suspect.id, nodes.len() + 1),
            prompt,
            response,
        });
    };

    let during = suspect.movements.iter().find(|m| m.window.overlaps(&window));
    let alibi = match during {
        Some(m) if m.kind == MovementKind::Claimed => {
            format!("I was in the {} the whole time. I'm sure of it.", m.location)
        }
        Some(m) if m.window.covers(&window) => format!(
            "I was in the {} from {} to {}. Plenty of people saw me there.",
            m.location,
            m.window.start(),
            m.window.end()
        ),
        Some(m) => format!(
            "I was in the {} from {} to {}. The rest of the time I was on my own.",
            m.location,
            m.window.start(),
            m.window.end()
        ),
        None => "I can't really remember. I was walking around the school.".to_string(),
    };
    push(
        format!(
            "Where were you between {} and {}?",
            window.start(),
            last_minute(window)
        ),
        alibi,
    );

    for rel in &suspect.relationships {
        let Some(other) = all.iter().find(|s| s.id == rel.other) else {
            continue;
        };
        let response = match rel.kind {
            RelationKind::Friend => format!("{} is a good friend of mine.", other.name),
            RelationKind::Rival => format!("{} and I don't get along.", other.name),
            RelationKind::Colleague => format!("{} and I work together most days.", other.name),
            RelationKind::Cousin => format!("{} is my cousin, actually.", other.name),
        };
        push(format!("How well do you know {}?", other.name), response);
    }

    if let Some(tie) = &suspect.target_tie {
        push(
            format!("What do you know about {}?", blueprint.target),
            format!("Well, I {tie}. That doesn't mean I had anything to do with it."),
        );
    }
    nodes
}

/// The last minute inside a half-open window, for prose.
fn last_minute(window: TimeWindow) -> TimePoint {
    TimePoint(window.end().minutes().saturating_sub(1).max(window.start().minutes()))
}
