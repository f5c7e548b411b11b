//! Fallback dispatcher: tries model candidates in order until one succeeds

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::types::{
    AttemptOutcome, Conversation, DispatchFailure, DispatchResult, GenerationParams,
    ModelCandidate,
};
use crate::upstream::{AttemptRequest, UpstreamClient};

/// Where a dispatch stands between attempts
#[derive(Debug)]
enum DispatchState {
    /// Next attempt goes to the candidate at this index
    Pending(usize),
    Done(DispatchResult),
}

/// Drives one upstream attempt per candidate, in configured order
pub struct FallbackDispatcher {
    client: Arc<dyn UpstreamClient>,
    /// Candidates in dispatch order (index 0 = primary)
    candidates: Vec<ModelCandidate>,
}

impl std::fmt::Debug for FallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackDispatcher")
            .field("candidates", &self.candidates)
            .finish()
    }
}

impl FallbackDispatcher {
    pub fn new(client: Arc<dyn UpstreamClient>, candidates: Vec<ModelCandidate>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(anyhow!("FallbackDispatcher requires at least one model candidate"));
        }
        Ok(Self { client, candidates })
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    /// Run attempts until one succeeds or every candidate has failed.
    ///
    /// A failure on the last candidate becomes the dispatch failure.
    pub async fn dispatch(
        &self,
        api_key: &str,
        conversation: &Conversation,
        params: &GenerationParams,
    ) -> DispatchResult {
        let request_id = Uuid::new_v4();
        let mut state = DispatchState::Pending(0);

        loop {
            state = match state {
                DispatchState::Done(result) => return result,
                DispatchState::Pending(index) => {
                    let model = &self.candidates[index];
                    debug!(
                        %request_id,
                        "Trying model {} ({}/{})",
                        model,
                        index + 1,
                        self.candidates.len()
                    );

                    let outcome = self
                        .client
                        .attempt(AttemptRequest {
                            api_key,
                            model,
                            conversation,
                            params,
                        })
                        .await;

                    self.advance(request_id, index, outcome)
                }
            };
        }
    }

    fn advance(&self, request_id: Uuid, index: usize, outcome: AttemptOutcome) -> DispatchState {
        let model = &self.candidates[index];
        let is_last = index + 1 >= self.candidates.len();

        let failure = match outcome {
            AttemptOutcome::Success(reply) => {
                if index > 0 {
                    info!(%request_id, "Request succeeded on fallback model {}", model);
                }
                return DispatchState::Done(DispatchResult::Success(reply));
            }
            AttemptOutcome::UpstreamError { status, message } => {
                DispatchFailure::Upstream { status, message }
            }
            AttemptOutcome::TransportError(cause) => DispatchFailure::Transport(cause),
        };

        if is_last {
            error!(
                %request_id,
                model = %model,
                "All {} models failed, last error: {}",
                self.candidates.len(),
                describe(&failure)
            );
            return DispatchState::Done(DispatchResult::Failure(failure));
        }

        warn!(
            %request_id,
            model = %model,
            attempt = index + 1,
            "Model failed, falling over to {}: {}",
            self.candidates[index + 1],
            describe(&failure)
        );
        DispatchState::Pending(index + 1)
    }
}

fn describe(failure: &DispatchFailure) -> String {
    match failure {
        DispatchFailure::Upstream { status, message } => format!("status {}: {}", status, message),
        DispatchFailure::Transport(cause) => cause.to_string(),
    }
}
