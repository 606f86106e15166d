//! Job and phase span helpers.

use tracing::Span;

use crate::model::JobId;

/// Start a span for one job attempt.
///
/// The `job.status` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_job_span(job_id: &JobId, attempt: u32) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.id" = %job_id,
        "job.attempt" = attempt,
        "job.status" = tracing::field::Empty,
    )
}

/// Start a span for one pipeline phase.
pub fn start_phase_span(phase: &str, seed: u64) -> Span {
    tracing::debug_span!("pipeline.phase", "phase.name" = phase, "pipeline.seed" = seed)
}

/// Record a status transition on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("job.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
