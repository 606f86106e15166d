//! GenAI semantic convention spans for completion calls.
//!
//! Field names follow the OpenTelemetry GenAI conventions
//! (`gen_ai.operation.name`, `gen_ai.provider.name`, `gen_ai.request.*`,
//! `gen_ai.response.model`, `gen_ai.usage.*`).

use tracing::Span;

/// Start a span for one completion call.
///
/// `gen_ai.response.model` and the usage fields start empty; fill them with
/// [`record_response_model`] and [`record_token_usage`].
pub fn start_completion_span(provider: &str, model: &str, max_tokens: u64) -> Span {
    tracing::info_span!(
        "gen_ai.chat",
        "gen_ai.operation.name" = "chat",
        "gen_ai.provider.name" = provider,
        "gen_ai.request.model" = model,
        "gen_ai.request.max_tokens" = max_tokens,
        "gen_ai.response.model" = tracing::field::Empty,
        "gen_ai.usage.input_tokens" = tracing::field::Empty,
        "gen_ai.usage.output_tokens" = tracing::field::Empty,
    )
}

pub fn record_response_model(span: &Span, model: &str) {
    span.record("gen_ai.response.model", model);
}

/// Only meaningful on spans from [`start_completion_span`].
pub fn record_token_usage(span: &Span, input: u64, output: u64) {
    span.record("gen_ai.usage.input_tokens", input);
    span.record("gen_ai.usage.output_tokens", output);
}
