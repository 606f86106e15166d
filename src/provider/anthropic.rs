//! Anthropic completions via rig-core.

use std::future::IntoFuture;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use super::{CompletionOptions, CompletionProvider, ProviderError};
use crate::error::{Error, Result};
use crate::telemetry::genai;

pub struct AnthropicProvider {
    client: rig::providers::anthropic::Client,
    model: String,
}

impl AnthropicProvider {
    /// # Errors
    /// Returns a provider error if the HTTP client cannot be constructed.
    pub fn new(api_key: &SecretString, model: &str) -> Result<Self> {
        let client = rig::providers::anthropic::Client::new(api_key.expose_secret()).map_err(
            |e| Error::Provider {
                provider: "anthropic".to_string(),
                message: e.to_string(),
            },
        )?;
        Ok(Self {
            client,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, ProviderError> {
        let span = genai::start_completion_span("anthropic", &self.model, options.max_tokens);
        let agent = self
            .client
            .agent(&self.model)
            .preamble(options.system.as_deref().unwrap_or_default())
            .max_tokens(options.max_tokens)
            .temperature(options.temperature)
            .build();

        let text = agent
            .prompt(prompt)
            .into_future()
            .instrument(span.clone())
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        genai::record_response_model(&span, &self.model);
        Ok(text)
    }
}
