//! Completion providers.
//!
//! A [`ProviderRegistry`] is built once at startup from providers in
//! priority order. Each completion request walks the list until one
//! provider answers; failures are logged and counted as fallbacks.

mod anthropic;
mod template;

pub use anthropic::AnthropicProvider;
pub use template::TemplateProvider;

use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Knobs passed through to every provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub system: Option<String>,
    pub max_tokens: u64,
    pub temperature: f64,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            system: None,
            max_tokens: 256,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("empty completion")]
    Empty,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, ProviderError>;
}

/// Text from the first provider that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub provider: String,
    /// Providers tried, including the one that answered.
    pub attempts: usize,
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider below every provider already registered.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Anthropic first when a key is configured, the offline template
    /// provider always last.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        if let Some(key) = &config.anthropic_api_key {
            let anthropic = AnthropicProvider::new(key, &config.anthropic_model)?;
            registry = registry.with_provider(Arc::new(anthropic));
        }
        Ok(registry.with_provider(Arc::new(TemplateProvider)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion> {
        let mut last: Option<(String, ProviderError)> = None;
        for (i, provider) in self.providers.iter().enumerate() {
            match provider.generate_completion(prompt, options).await {
                Ok(text) if text.trim().is_empty() => {
                    last = Some((provider.name().to_string(), ProviderError::Empty));
                }
                Ok(text) => {
                    info!(provider = provider.name(), attempts = i + 1, "completion ready");
                    return Ok(Completion {
                        text: text.trim().to_string(),
                        provider: provider.name().to_string(),
                        attempts: i + 1,
                    });
                }
                Err(e) => {
                    last = Some((provider.name().to_string(), e));
                }
            }
            if let Some((name, e)) = &last {
                warn!(provider = %name, error = %e, "completion provider failed, falling back");
                crate::telemetry::metrics::provider_fallbacks()
                    .add(1, &[KeyValue::new("provider", name.clone())]);
            }
        }

        Err(match last {
            Some((provider, e)) => Error::Provider {
                provider,
                message: e.to_string(),
            },
            None => Error::Provider {
                provider: "none".to_string(),
                message: "no completion providers registered".to_string(),
            },
        })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing(&'static str);

    #[async_trait]
    impl CompletionProvider for Failing {
        fn name(&self) -> &str {
            self.0
        }

        async fn generate_completion(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> std::result::Result<String, ProviderError> {
            Err(ProviderError::Unavailable("down".into()))
        }
    }

    struct Fixed(&'static str, &'static str);

    #[async_trait]
    impl CompletionProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn generate_completion(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> std::result::Result<String, ProviderError> {
            Ok(self.1.to_string())
        }
    }

    #[tokio::test]
    async fn falls_through_in_priority_order() {
        let registry = ProviderRegistry::new()
            .with_provider(Arc::new(Failing("primary")))
            .with_provider(Arc::new(Fixed("blank", "   ")))
            .with_provider(Arc::new(Fixed("backup", " A mystery awaits. ")))
            .with_provider(Arc::new(Fixed("never", "unused")));

        let completion = registry
            .complete("teaser", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.provider, "backup");
        assert_eq!(completion.attempts, 3);
        assert_eq!(completion.text, "A mystery awaits.");
    }

    #[tokio::test]
    async fn all_failing_reports_last_provider() {
        let registry = ProviderRegistry::new()
            .with_provider(Arc::new(Failing("a")))
            .with_provider(Arc::new(Failing("b")));
        let err = registry
            .complete("teaser", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { ref provider, .. } if provider == "b"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn empty_registry_is_a_provider_error() {
        let err = ProviderRegistry::new()
            .complete("teaser", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }
}
