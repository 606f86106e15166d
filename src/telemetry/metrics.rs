//! Metric instrument factories for casegen.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"casegen"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for casegen instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("casegen")
}

/// Counter: jobs submitted.
/// Labels: `subject`, `difficulty`.
pub fn jobs_submitted() -> Counter<u64> {
    meter()
        .u64_counter("casegen.jobs.submitted")
        .with_description("Number of generation jobs submitted")
        .build()
}

/// Counter: job status transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("casegen.jobs.state_transitions")
        .with_description("Number of generation job status transitions")
        .build()
}

/// Counter: cases generated and saved.
/// Labels: `template`.
pub fn cases_generated() -> Counter<u64> {
    meter()
        .u64_counter("casegen.cases.generated")
        .with_description("Number of cases generated and saved")
        .build()
}

/// Counter: cases rejected as duplicates.
/// Labels: `reason` ("identical" | "similar" | "claimed").
pub fn duplicates_rejected() -> Counter<u64> {
    meter()
        .u64_counter("casegen.cases.duplicates_rejected")
        .with_description("Cases rejected by the uniqueness check")
        .build()
}

/// Counter: quality rule violations.
/// Labels: `rule`.
pub fn quality_violations() -> Counter<u64> {
    meter()
        .u64_counter("casegen.cases.quality_violations")
        .with_description("Quality rule violations found in generated cases")
        .build()
}

/// Counter: completion calls that fell through to a lower-priority provider.
/// Labels: `provider` (the one that failed).
pub fn provider_fallbacks() -> Counter<u64> {
    meter()
        .u64_counter("casegen.provider.fallbacks")
        .with_description("Completion provider failures that triggered a fallback")
        .build()
}

/// Counter: queue operations.
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("casegen.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Histogram: pipeline phase duration in milliseconds.
/// Labels: `phase`.
pub fn phase_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("casegen.pipeline.phase_duration_ms")
        .with_description("Pipeline phase duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Histogram: job attempt duration in milliseconds.
/// Labels: `outcome`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("casegen.jobs.duration_ms")
        .with_description("Job attempt duration in milliseconds")
        .with_unit("ms")
        .build()
}
