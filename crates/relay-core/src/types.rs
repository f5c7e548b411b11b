//! Shared types for the relay: conversation turns, candidates, attempt outcomes

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::upstream::TransportError;

/// Message role for turns the relay builds itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of a conversation as it goes over the wire.
///
/// Turns mapped from caller history keep whatever `role` and `content` the
/// caller sent, so both fields are raw JSON and may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
}

impl ChatTurn {
    /// Build a turn with a known role and text content
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role: Some(Value::String(role.to_string())),
            content: Some(Value::String(content.into())),
        }
    }

    /// Build a turn from raw caller-supplied values, copied verbatim
    pub fn raw(role: Option<Value>, content: Option<Value>) -> Self {
        Self { role, content }
    }

    pub fn role(&self) -> Option<&Value> {
        self.role.as_ref()
    }

    pub fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// The role parsed as one of the known roles, if it is one
    pub fn known_role(&self) -> Option<ChatRole> {
        match self.role.as_ref()?.as_str()? {
            "system" => Some(ChatRole::System),
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }

    /// Text content, when the content is a JSON string
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref()?.as_str()
    }
}

/// Ordered turn sequence sent upstream: system, history, then the new user turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    pub fn new(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// An upstream model identifier the dispatcher may try
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCandidate(String);

impl ModelCandidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelCandidate {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ModelCandidate {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Sampling parameters forwarded to the upstream service unvalidated.
/// Values are kept as raw JSON so caller overrides go out exactly as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: Value,
    pub top_p: Value,
    pub max_tokens: Value,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: json!(0.7),
            top_p: json!(1),
            max_tokens: json!(4096),
        }
    }
}

/// JSON truthiness: `null`, `false`, `0`, and `""` are falsy
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Result of one bounded upstream attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Upstream produced a completion (possibly the empty-completion placeholder)
    Success(String),
    /// Upstream answered with a non-success status
    UpstreamError { status: u16, message: String },
    /// The call never produced a usable response
    TransportError(TransportError),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(_) => write!(f, "success"),
            Self::UpstreamError { status, message } => {
                write!(f, "upstream error {}: {}", status, message)
            }
            Self::TransportError(cause) => write!(f, "transport error: {}", cause),
        }
    }
}

/// Terminal failure of a dispatch, carrying the last candidate's outcome
#[derive(Debug)]
pub enum DispatchFailure {
    Upstream { status: u16, message: String },
    Transport(TransportError),
}

/// Terminal decision of a dispatch
#[derive(Debug)]
pub enum DispatchResult {
    Success(String),
    Failure(DispatchFailure),
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
