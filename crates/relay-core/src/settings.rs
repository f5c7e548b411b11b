//! Runtime settings injected into the relay at construction

use std::time::Duration;

use crate::types::{GenerationParams, ModelCandidate};
use crate::upstream::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_BASE_URL};

/// Built-in system prompt used when neither config nor caller overrides it
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../../../config/system_prompt.md");

/// Free-tier models tried in this order when none are configured
pub const DEFAULT_MODELS: &[&str] = &[
    "meta-llama/llama-3.3-8b-instruct:free",
    "qwen/qwen2-7b-instruct:free",
    "google/gemma-2-9b-it:free",
    "nousresearch/hermes-2-pro-llama-3-8b:free",
];

/// Process-wide relay configuration, read-only once the relay is built
#[derive(Clone)]
pub struct RelaySettings {
    /// OpenRouter credential; `None` makes every request fail with a config error
    pub api_key: Option<String>,
    pub base_url: String,
    pub attempt_timeout: Duration,
    pub models: Vec<ModelCandidate>,
    pub system_prompt: String,
    pub defaults: GenerationParams,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            models: DEFAULT_MODELS.iter().map(|m| ModelCandidate::new(*m)).collect(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            defaults: GenerationParams::default(),
        }
    }
}

impl std::fmt::Debug for RelaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySettings")
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("base_url", &self.base_url)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("models", &self.models)
            .field("system_prompt_len", &self.system_prompt.len())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl RelaySettings {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_models<I, M>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModelCandidate>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// The credential, if one is set and non-empty
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Printable form of a credential: keys of 8+ chars keep their first 3 and
/// last 4 chars, anything shorter is fully hidden.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    match len {
        0 => "(empty)".to_string(),
        1..=7 => "***".to_string(),
        _ => {
            let head: String = secret.chars().take(3).collect();
            let tail: String = secret.chars().skip(len - 4).collect();
            format!("{head}...{tail}")
        }
    }
}
