//! Request boundary: input and credential checks, then assemble, dispatch, translate

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error};

use crate::assembler::assemble;
use crate::dispatcher::FallbackDispatcher;
use crate::settings::RelaySettings;
use crate::translator::{RelayError, Reply};
use crate::types::{Conversation, GenerationParams, is_truthy};
use crate::upstream::{OpenRouterClient, UpstreamClient};

/// Inbound chat request.
///
/// Every field is optional on the wire. Overrides are kept as raw JSON:
/// `None` means the field was absent, while an explicit `null` or a value of
/// the wrong type is forwarded upstream as sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: Option<Value>,
    #[serde(default)]
    pub history: Value,
    #[serde(default, deserialize_with = "present")]
    pub temperature: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub top_p: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub max_tokens: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub system: Option<Value>,
}

impl ChatRequest {
    /// Request with just a prompt
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(Value::String(prompt.into())),
            ..Self::default()
        }
    }

    /// Parse a raw request body. Anything that is not a JSON object reads as
    /// an empty request, which then fails the prompt check.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
            Ok(_) => Self::default(),
            Err(e) => {
                debug!("Unparseable request body: {}", e);
                Self::default()
            }
        }
    }
}

/// Any value that appears in the body, `null` included, is `Some`
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Turns one inbound request into one reply
pub struct ChatRelay {
    settings: RelaySettings,
    dispatcher: FallbackDispatcher,
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRelay")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatRelay {
    /// Build a relay talking to OpenRouter over HTTP
    pub fn new(settings: RelaySettings) -> Result<Self> {
        let client = OpenRouterClient::new(settings.base_url.clone(), settings.attempt_timeout)?;
        Self::with_client(settings, Arc::new(client))
    }

    /// Build a relay over any upstream client
    pub fn with_client(settings: RelaySettings, client: Arc<dyn UpstreamClient>) -> Result<Self> {
        let dispatcher = FallbackDispatcher::new(client, settings.models.clone())?;
        Ok(Self {
            settings,
            dispatcher,
        })
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &FallbackDispatcher {
        &self.dispatcher
    }

    /// Handle a request end to end. Never fails; every error becomes a reply.
    pub async fn handle(&self, request: ChatRequest) -> Reply {
        match self.run(request).await {
            Ok(reply) => reply,
            Err(e) => e.into(),
        }
    }

    async fn run(&self, request: ChatRequest) -> std::result::Result<Reply, RelayError> {
        let prompt = request
            .prompt
            .filter(is_truthy)
            .ok_or(RelayError::MissingPrompt)?;

        let Some(api_key) = self.settings.api_key() else {
            error!("OPENROUTER_API_KEY is not set.");
            return Err(RelayError::MissingApiKey);
        };

        let system = request
            .system
            .unwrap_or_else(|| Value::String(self.settings.system_prompt.clone()));
        let conversation: Conversation = assemble(system, &request.history, prompt);

        let defaults = &self.settings.defaults;
        let params = GenerationParams {
            temperature: request
                .temperature
                .unwrap_or_else(|| defaults.temperature.clone()),
            top_p: request.top_p.unwrap_or_else(|| defaults.top_p.clone()),
            max_tokens: request
                .max_tokens
                .unwrap_or_else(|| defaults.max_tokens.clone()),
        };

        let result = self
            .dispatcher
            .dispatch(api_key, &conversation, &params)
            .await;
        Ok(result.into())
    }
}
