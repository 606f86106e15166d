//! Offline provider that composes text from the prompt itself.

use async_trait::async_trait;

use super::{CompletionOptions, CompletionProvider, ProviderError};

/// Always available. Turns a teaser prompt into a short line built from
/// its `Title:` and `Hook:` fields so jobs complete without network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateProvider;

#[async_trait]
impl CompletionProvider for TemplateProvider {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let field = |key: &str| {
            prompt
                .lines()
                .find_map(|l| l.strip_prefix(key))
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        match (field("Title:"), field("Hook:")) {
            (Some(title), Some(hook)) => Ok(format!("{title}: {hook} Can you crack the case?")),
            (Some(title), None) => Ok(format!("{title}. Can you crack the case?")),
            _ => Err(ProviderError::Unavailable(
                "prompt has no Title: line".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn composes_from_prompt_fields() {
        let text = TemplateProvider
            .generate_completion(
                "Write a teaser.\nTitle: The Missing Trophy\nHook: It vanished before lunch.\n",
                &CompletionOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            text,
            "The Missing Trophy: It vanished before lunch. Can you crack the case?"
        );
    }

    #[tokio::test]
    async fn rejects_prompt_without_title() {
        assert!(
            TemplateProvider
                .generate_completion("hello", &CompletionOptions::default())
                .await
                .is_err()
        );
    }
}
