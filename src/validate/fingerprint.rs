//! Reduce a case to four facet hashes plus a combined hash.
//!
//! Each facet is a SHA-256 over an explicit, ordered field list. Fields are
//! terminated by a unit separator and records by a record separator, so
//! adjacent values can never run together. Case and evidence ids, timestamps
//! and the provider-written teaser are left out: two runs that build the same
//! story hash the same.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::model::{CaseFingerprint, MysteryCase};

const FIELD_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

struct FacetHasher(Sha256);

impl FacetHasher {
    fn new(facet: &str) -> Self {
        let mut h = Sha256::new();
        h.update(facet.as_bytes());
        h.update([RECORD_SEP]);
        Self(h)
    }

    fn field(&mut self, value: impl AsRef<str>) -> &mut Self {
        self.0.update(value.as_ref().as_bytes());
        self.0.update([FIELD_SEP]);
        self
    }

    fn end_record(&mut self) -> &mut Self {
        self.0.update([RECORD_SEP]);
        self
    }

    fn finish(self) -> String {
        format!("{:x}", self.0.finalize())
    }
}

impl CaseFingerprint {
    pub fn compute(case: &MysteryCase) -> Self {
        let structure_hash = structure_hash(case);
        let character_hash = character_hash(case);
        let puzzle_hash = puzzle_hash(case);
        let location_hash = location_hash(case);

        let mut combined = Sha256::new();
        for hash in [&structure_hash, &character_hash, &puzzle_hash, &location_hash] {
            combined.update(hash.as_bytes());
            combined.update([FIELD_SEP]);
        }
        let combined_hash = format!("{:x}", combined.finalize());

        Self {
            structure_hash,
            character_hash,
            puzzle_hash,
            location_hash,
            combined_hash,
            timestamp: Utc::now(),
        }
    }
}

/// Crime skeleton: template, kind, timed steps, traces and the culprit's role.
fn structure_hash(case: &MysteryCase) -> String {
    let bp = &case.blueprint;
    let mut h = FacetHasher::new("structure");
    h.field(&bp.template_id)
        .field(bp.kind.to_string())
        .field(bp.crime_window.to_string())
        .end_record();
    for step in &bp.steps {
        h.field(step.at.minutes().to_string())
            .field(&step.location)
            .field(&step.description)
            .end_record();
    }
    for trace in &bp.traces {
        h.field(trace.step_index.to_string())
            .field(trace.signature.evidence_type.to_string())
            .field(&trace.signature.description)
            .field(trace.signature.requires.as_deref().unwrap_or(""))
            .end_record();
    }
    let culprit_role = case.culprit().map(|s| s.role.as_str()).unwrap_or("");
    h.field(culprit_role).end_record();
    h.finish()
}

/// Roster: who the suspects are and where they were.
fn character_hash(case: &MysteryCase) -> String {
    let mut suspects: Vec<_> = case.suspects.iter().collect();
    suspects.sort_by_key(|s| s.id);

    let mut h = FacetHasher::new("character");
    for s in suspects {
        h.field(&s.name).field(&s.role);
        let mut attributes = s.attributes.clone();
        attributes.sort();
        h.field(attributes.join(","));
        h.field(s.personality.join(","));
        h.field(s.target_tie.as_deref().unwrap_or(""));
        for m in &s.movements {
            h.field(format!("{:?}@{}:{}", m.kind, m.location, m.window));
        }
        for r in &s.relationships {
            h.field(format!("{}:{}", r.kind, r.other));
        }
        h.field(if s.is_guilty { "guilty" } else { "innocent" });
        h.end_record();
    }
    h.finish()
}

fn puzzle_hash(case: &MysteryCase) -> String {
    let mut h = FacetHasher::new("puzzle");
    for p in &case.puzzles {
        h.field(format!("{:?}", p.skill))
            .field(&p.topic.code)
            .field(&p.question)
            .field(&p.answer)
            .end_record();
    }
    h.finish()
}

/// Sorted, de-duplicated set of every place the case mentions.
fn location_hash(case: &MysteryCase) -> String {
    let mut places: Vec<&str> = Vec::new();
    places.extend(case.blueprint.steps.iter().map(|s| s.location.as_str()));
    places.extend(case.scenes.iter().map(|s| s.location.as_str()));
    for s in &case.suspects {
        places.extend(s.movements.iter().map(|m| m.location.as_str()));
    }
    places.sort_unstable();
    places.dedup();

    let mut h = FacetHasher::new("location");
    for place in places {
        h.field(place);
    }
    h.end_record();
    h.finish()
}
