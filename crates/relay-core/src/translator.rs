//! Maps dispatch results and early rejections to caller-facing replies

use serde::{Deserialize, Serialize};

use crate::types::{DispatchFailure, DispatchResult};

pub const MISSING_PROMPT_REPLY: &str = "⚠️ No message received.";
pub const MISSING_API_KEY_REPLY: &str = "⚠️ Server configuration error: API key missing.";
pub const TRANSPORT_FAILURE_REPLY: &str = "⚠️ Error reaching OpenRouter API.";
pub const UPSTREAM_ERROR_PREFIX: &str = "⚠️ OpenRouter error: ";

/// Request rejected before any upstream contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("no prompt in request")]
    MissingPrompt,
    #[error("OpenRouter API key is not configured")]
    MissingApiKey,
}

/// JSON body returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyBody {
    pub reply: String,
}

/// Caller-facing reply: HTTP status plus `{reply}` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: ReplyBody,
}

impl Reply {
    fn new(status: u16, reply: impl Into<String>) -> Self {
        Self {
            status,
            body: ReplyBody {
                reply: reply.into(),
            },
        }
    }

    pub fn text(&self) -> &str {
        &self.body.reply
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

impl From<DispatchResult> for Reply {
    fn from(result: DispatchResult) -> Self {
        match result {
            DispatchResult::Success(reply) => Reply::new(200, reply),
            DispatchResult::Failure(DispatchFailure::Upstream { status, message }) => {
                Reply::new(status, format!("{}{}", UPSTREAM_ERROR_PREFIX, message))
            }
            DispatchResult::Failure(DispatchFailure::Transport(_)) => {
                Reply::new(500, TRANSPORT_FAILURE_REPLY)
            }
        }
    }
}

impl From<RelayError> for Reply {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::MissingPrompt => Reply::new(400, MISSING_PROMPT_REPLY),
            RelayError::MissingApiKey => Reply::new(500, MISSING_API_KEY_REPLY),
        }
    }
}
