//! Culprit Determination Engine.
//!
//! Scores every suspect on opportunity, motive, means and trace match
//! against the blueprint, then picks the strictly best eligible suspect.
//! A suspect is eligible only with opportunity above zero. Ties fall to the
//! lowest suspect id; nothing here consumes randomness.

use std::cmp::Ordering;

use tracing::{debug, error};

use super::{ContextSlot, GenerationContext, GenerationPhase};
use crate::config::ScoringWeights;
use crate::error::{Error, Result};
use crate::model::{
    CrimeBlueprint, CulpritDetermination, MovementKind, RelationKind, ScoreCard, SuspectId,
    SuspectProfile, covered_minutes,
};
use crate::templates::CrimeTemplate;

/// Added to the role weight when the suspect is tied to the target.
pub const TARGET_TIE_MOTIVE: f64 = 0.4;
/// Added per rival relationship.
pub const RIVAL_MOTIVE: f64 = 0.1;

/// Scores are compared at this resolution so float noise never decides.
const SCORE_SCALE: f64 = 1e6;

pub struct CulpritPhase {
    weights: ScoringWeights,
}

impl CulpritPhase {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }
}

impl GenerationPhase for CulpritPhase {
    fn name(&self) -> &'static str {
        "culprit"
    }

    fn output(&self) -> ContextSlot {
        ContextSlot::Determination
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<()> {
        let determination = determine(
            ctx.blueprint()?,
            ctx.template()?,
            ctx.suspects()?,
            &self.weights,
        )?;
        debug!(
            culprit = %determination.culprit_id,
            composite = determination.composite_score,
            "culprit determined"
        );
        ctx.determination = Some(determination);
        Ok(())
    }
}

/// Fraction of the crime window not covered by a witnessed movement away
/// from every trace location.
pub fn opportunity(suspect: &SuspectProfile, blueprint: &CrimeBlueprint) -> f64 {
    let window = blueprint.crime_window;
    if window.is_empty() {
        return 0.0;
    }
    let alibis: Vec<_> = suspect
        .movements
        .iter()
        .filter(|m| m.kind == MovementKind::Witnessed)
        .filter(|m| !blueprint.is_trace_location(&m.location))
        .map(|m| m.window)
        .collect();
    if alibis.iter().any(|w| w.covers(&window)) {
        return 0.0;
    }
    let covered = covered_minutes(&window, &alibis);
    1.0 - f64::from(covered) / f64::from(window.duration())
}

/// Role weight from the template, plus a target tie and rivalries.
pub fn motive(suspect: &SuspectProfile, template: &CrimeTemplate) -> f64 {
    let mut score = template.motive_weight(&suspect.role);
    if suspect.target_tie.is_some() {
        score += TARGET_TIE_MOTIVE;
    }
    let rivals = suspect
        .relationships
        .iter()
        .filter(|r| r.kind == RelationKind::Rival)
        .count();
    score += RIVAL_MOTIVE * rivals as f64;
    score.min(1.0)
}

/// 1 when the suspect's role or movements reach any trace location.
pub fn means(suspect: &SuspectProfile, blueprint: &CrimeBlueprint) -> f64 {
    let reaches = blueprint.traces.iter().any(|t| {
        suspect.has_access_to(&t.location)
            || suspect.movements.iter().any(|m| m.location == t.location)
    });
    if reaches { 1.0 } else { 0.0 }
}

/// Fraction of traces the suspect's attributes could have produced.
pub fn trace_match(suspect: &SuspectProfile, blueprint: &CrimeBlueprint) -> f64 {
    if blueprint.traces.is_empty() {
        return 0.0;
    }
    let consistent = blueprint
        .traces
        .iter()
        .filter(|t| t.signature.is_consistent_with(&suspect.attributes))
        .count();
    consistent as f64 / blueprint.traces.len() as f64
}

pub fn score(
    suspect: &SuspectProfile,
    blueprint: &CrimeBlueprint,
    template: &CrimeTemplate,
    weights: &ScoringWeights,
) -> ScoreCard {
    let opportunity = opportunity(suspect, blueprint);
    let motive = motive(suspect, template);
    let means = means(suspect, blueprint);
    let trace_match = trace_match(suspect, blueprint);
    let composite = weights.opportunity * opportunity
        + weights.trace_match * trace_match
        + weights.motive * motive
        + weights.means * means;
    ScoreCard {
        suspect_id: suspect.id,
        opportunity,
        motive,
        means,
        trace_match,
        composite,
    }
}

fn quantize(x: f64) -> i64 {
    (x * SCORE_SCALE).round() as i64
}

/// Ranking order: eligible first, then composite, trace match, motive and
/// means (all descending), then lowest id.
fn rank(a: &ScoreCard, b: &ScoreCard) -> Ordering {
    let eligible = |c: &ScoreCard| quantize(c.opportunity) > 0;
    eligible(b)
        .cmp(&eligible(a))
        .then_with(|| quantize(b.composite).cmp(&quantize(a.composite)))
        .then_with(|| quantize(b.trace_match).cmp(&quantize(a.trace_match)))
        .then_with(|| quantize(b.motive).cmp(&quantize(a.motive)))
        .then_with(|| quantize(b.means).cmp(&quantize(a.means)))
        .then_with(|| a.suspect_id.cmp(&b.suspect_id))
}

pub fn determine(
    blueprint: &CrimeBlueprint,
    template: &CrimeTemplate,
    suspects: &[SuspectProfile],
    weights: &ScoringWeights,
) -> Result<CulpritDetermination> {
    let mut cards: Vec<ScoreCard> = suspects
        .iter()
        .map(|s| score(s, blueprint, template, weights))
        .collect();
    cards.sort_by(rank);

    let Some(best) = cards.first().copied().filter(|c| quantize(c.opportunity) > 0) else {
        error!(
            template = %blueprint.template_id,
            window = %blueprint.crime_window,
            suspects = suspects.len(),
            "no suspect had opportunity; suspect builder defect"
        );
        return Err(Error::ImpossibleCulprit(format!(
            "crime window {}, {} suspects",
            blueprint.crime_window,
            suspects.len()
        )));
    };

    let rationale = rationale(&best, cards.get(1), suspects, blueprint, weights);
    Ok(CulpritDetermination {
        culprit_id: best.suspect_id,
        opportunity_score: best.opportunity,
        motive_score: best.motive,
        means_score: best.means,
        trace_match_score: best.trace_match,
        composite_score: best.composite,
        rationale,
        scorecards: cards,
    })
}

fn rationale(
    best: &ScoreCard,
    runner_up: Option<&ScoreCard>,
    suspects: &[SuspectProfile],
    blueprint: &CrimeBlueprint,
    weights: &ScoringWeights,
) -> String {
    let name = |id: SuspectId| {
        suspects
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
            .unwrap_or("unknown")
    };
    let mut text = format!(
        "{} ({}) is the culprit with composite score {:.2}: opportunity {:.2} during {}, trace match {:.2}, motive {:.2}, means {:.2}.",
        name(best.suspect_id),
        best.suspect_id,
        best.composite,
        best.opportunity,
        blueprint.crime_window,
        best.trace_match,
        best.motive,
        best.means,
    );

    let Some(other) = runner_up else {
        return text;
    };
    let contributions = [
        ("opportunity", weights.opportunity, best.opportunity, other.opportunity),
        ("trace match", weights.trace_match, best.trace_match, other.trace_match),
        ("motive", weights.motive, best.motive, other.motive),
        ("means", weights.means, best.means, other.means),
    ];
    let decisive: Vec<&str> = contributions
        .iter()
        .filter(|(_, w, ours, theirs)| quantize(w * ours) > quantize(w * theirs))
        .map(|(label, ..)| *label)
        .collect();

    text.push_str(&format!(
        " Runner-up {} ({}) scored {:.2}",
        name(other.suspect_id),
        other.suspect_id,
        other.composite
    ));
    if quantize(other.opportunity) == 0 {
        text.push_str(" but had a full alibi");
    }
    if decisive.is_empty() {
        text.push_str("; the tie was broken by lowest suspect id.");
    } else {
        text.push_str(&format!("; the decision rested on {}.", decisive.join(" and ")));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AssetKind, AssetSpec, CrimeKind, CrimeStep, EvidenceType, PhysicalSignature,
        SuspectMovement, TimePoint, TimeWindow, TracePoint,
    };
    use crate::templates::TemplateCatalog;

    fn blueprint() -> CrimeBlueprint {
        CrimeBlueprint {
            template_id: "t".into(),
            kind: CrimeKind::Theft,
            title: "t".into(),
            target: "the cup".into(),
            steps: vec![
                CrimeStep {
                    index: 0,
                    at: TimePoint(60),
                    description: "a".into(),
                    location: "Hall".into(),
                },
                CrimeStep {
                    index: 1,
                    at: TimePoint(79),
                    description: "b".into(),
                    location: "Hall".into(),
                },
            ],
            traces: vec![TracePoint {
                id: "T1".into(),
                step_index: 0,
                location: "Hall".into(),
                signature: PhysicalSignature {
                    evidence_type: EvidenceType::Physical,
                    description: "key".into(),
                    requires: Some("key".into()),
                },
            }],
            crime_window: TimeWindow::from_minutes(60, 80),
        }
    }

    fn suspect(id: u8, movements: Vec<(u32, u32, &str)>, attributes: &[&str]) -> SuspectProfile {
        SuspectProfile {
            id: SuspectId(id),
            name: format!("N{id}"),
            role: "Janitor".into(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
            access: vec![],
            personality: vec![],
            movements: movements
                .into_iter()
                .map(|(a, b, loc)| SuspectMovement {
                    window: TimeWindow::from_minutes(a, b),
                    location: loc.into(),
                    kind: MovementKind::Witnessed,
                })
                .collect(),
            relationships: vec![],
            target_tie: None,
            dialogue: vec![],
            portrait: AssetSpec::new(AssetKind::Portrait, "p"),
        }
    }

    fn template() -> CrimeTemplate {
        TemplateCatalog::builtin()
            .unwrap()
            .crime("missing-trophy")
            .unwrap()
            .clone()
    }

    #[test]
    fn opportunity_tracks_uncovered_fraction() {
        let bp = blueprint();
        assert_eq!(opportunity(&suspect(1, vec![], &[]), &bp), 1.0);
        assert_eq!(opportunity(&suspect(1, vec![(50, 90, "Field")], &[]), &bp), 0.0);
        assert_eq!(opportunity(&suspect(1, vec![(60, 70, "Field")], &[]), &bp), 0.5);
        // Being seen at the crime scene is not an alibi.
        assert_eq!(opportunity(&suspect(1, vec![(50, 90, "Hall")], &[]), &bp), 1.0);
    }

    #[test]
    fn alibied_suspect_is_never_chosen() {
        let bp = blueprint();
        let suspects = vec![
            suspect(1, vec![(50, 90, "Field")], &["key"]),
            suspect(2, vec![(60, 70, "Field")], &[]),
        ];
        let d = determine(&bp, &template(), &suspects, &ScoringWeights::default()).unwrap();
        assert_eq!(d.culprit_id, SuspectId(2));
        assert!(d.opportunity_score > 0.0);
        assert_eq!(d.scorecards.len(), 2);
    }

    #[test]
    fn ties_go_to_lowest_id() {
        let bp = blueprint();
        let suspects = vec![suspect(2, vec![], &[]), suspect(1, vec![], &[])];
        let d = determine(&bp, &template(), &suspects, &ScoringWeights::default()).unwrap();
        assert_eq!(d.culprit_id, SuspectId(1));
        assert!(d.rationale.contains("lowest suspect id"));
    }

    #[test]
    fn no_opportunity_is_impossible() {
        let bp = blueprint();
        let suspects = vec![
            suspect(1, vec![(0, 200, "Field")], &["key"]),
            suspect(2, vec![(55, 85, "Canteen")], &["key"]),
        ];
        let err = determine(&bp, &template(), &suspects, &ScoringWeights::default()).unwrap_err();
        assert!(matches!(err, Error::ImpossibleCulprit(_)));
    }

    #[test]
    fn trace_match_breaks_composite_ties() {
        let bp = blueprint();
        let suspects = vec![suspect(1, vec![], &[]), suspect(2, vec![], &["key"])];
        let d = determine(&bp, &template(), &suspects, &ScoringWeights::default()).unwrap();
        assert_eq!(d.culprit_id, SuspectId(2));
        assert!(d.rationale.contains("trace match"));
    }
}
