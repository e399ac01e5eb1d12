use std::sync::Arc;
use std::time::Duration;

use super::{Args, Capability, CapabilityError, Outcome, ToolContext};

/// A candidate that errored or timed out and was skipped.
#[derive(Debug, Clone)]
pub struct CandidateAttempt {
    pub tool: String,
    pub error: CapabilityError,
}

/// Result of trying an ordered candidate list.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub outcome: Outcome,
    /// Tool whose result was accepted; `None` when every candidate failed.
    pub tool: Option<String>,
    pub rejected: Vec<CandidateAttempt>,
}

impl Invocation {
    pub fn accepted(&self) -> bool {
        self.tool.is_some()
    }
}

/// Try `candidates` in order and accept the first one that returns an
/// [`Outcome`] (successful or not). Errors and timeouts move on to the next
/// candidate. `timeout` bounds each candidate separately.
pub async fn invoke_candidates(
    capability_id: &str,
    candidates: &[Arc<dyn Capability>],
    args: &Args,
    ctx: &ToolContext,
    timeout: Option<Duration>,
) -> Invocation {
    let mut rejected = Vec::new();

    for tool in candidates {
        let call = tool.run(args.clone(), ctx);
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(r) => r,
                Err(_) => Err(CapabilityError::Timeout(limit)),
            },
            None => call.await,
        };

        match result {
            Ok(outcome) => {
                return Invocation {
                    outcome,
                    tool: Some(tool.name().to_string()),
                    rejected,
                };
            }
            Err(error) => {
                tracing::debug!(
                    "[Invoke] candidate '{}' for '{}' failed: {}",
                    tool.name(),
                    capability_id,
                    error
                );
                rejected.push(CandidateAttempt {
                    tool: tool.name().to_string(),
                    error,
                });
            }
        }
    }

    let outcome = match rejected.last() {
        None => CapabilityError::NotFound(capability_id.to_string()).into(),
        Some(last) if rejected.len() == 1 => last.error.clone().into(),
        Some(last) => Outcome::failure(format!(
            "All {} candidates for '{}' failed; last error: {}",
            rejected.len(),
            capability_id,
            last.error
        )),
    };

    Invocation {
        outcome,
        tool: None,
        rejected,
    }
}
