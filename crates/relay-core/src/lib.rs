//! relay-core - fallback dispatch of chat requests to OpenRouter
//!
//! This crate provides:
//! - Conversation assembly from a system prompt, caller history, and a new prompt
//! - A bounded-time OpenRouter chat-completions client
//! - The fallback dispatcher that tries model candidates in order
//! - Translation of dispatch results into `{reply}` bodies with status codes

pub mod assembler;
pub mod dispatcher;
pub mod relay;
pub mod settings;
pub mod translator;
pub mod types;
pub mod upstream;

pub use assembler::assemble;
pub use dispatcher::FallbackDispatcher;
pub use relay::{ChatRelay, ChatRequest};
pub use settings::{DEFAULT_MODELS, DEFAULT_SYSTEM_PROMPT, RelaySettings, mask_secret};
pub use translator::{RelayError, Reply, ReplyBody};
pub use types::{
    AttemptOutcome, ChatRole, ChatTurn, Conversation, DispatchFailure, DispatchResult,
    GenerationParams, ModelCandidate,
};
pub use upstream::{
    AttemptRequest, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_BASE_URL, OpenRouterClient, TransportError,
    UpstreamClient,
};
