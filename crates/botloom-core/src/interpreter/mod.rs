//! Step Interpreter - one agent's bounded reason/act loop.
//!
//! Each cycle asks the reasoner for the next decision, invokes the chosen
//! capability and feeds the observation back. The loop ends on a final
//! answer, a reasoner failure or after `max_steps` actions.

pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::capability::{invoke_candidates, Args, CapabilitySet, ToolContext};
use crate::reasoner::{Message, ReasonRequest, Reasoner};

pub use prompt::{parse_decision, Decision};

pub const DEFAULT_MAX_STEPS: usize = 8;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Args::is_empty")]
    pub args: Args,
    pub observation: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpreterOutcome {
    pub final_answer: Option<String>,
    pub steps: Vec<ReactStep>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    pub max_steps: usize,
    /// Per capability call; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Clone)]
pub struct StepInterpreter {
    reasoner: Arc<dyn Reasoner>,
    config: InterpreterConfig,
}

impl StepInterpreter {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: InterpreterConfig) -> Self {
        Self { reasoner, config }
    }

    pub fn max_steps(&self) -> usize {
        self.config.max_steps
    }

    /// Pursue `goal` with the given capabilities.
    pub async fn run(
        &self,
        goal: &str,
        capabilities: &CapabilitySet,
        ctx: &ToolContext,
    ) -> InterpreterOutcome {
        let system = prompt::system_prompt(ctx, capabilities);
        let mut messages = vec![Message::user(goal)];
        let mut steps = Vec::new();
        let who = ctx.role.as_deref().unwrap_or(&ctx.metadata.bot_id).to_string();

        for index in 0..self.config.max_steps {
            let request = ReasonRequest {
                system: Some(system.clone()),
                messages: messages.clone(),
            };
            let reply = match self.reasoner.complete(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!("[Interpreter] {} reasoning failed at step {}: {}", who, index, e);
                    return InterpreterOutcome {
                        final_answer: None,
                        steps,
                        success: false,
                        error: Some(e.to_string()),
                    };
                }
            };

            let (thought, action, args) = match parse_decision(&reply) {
                Decision::Finish { answer, .. } => {
                    tracing::info!("[Interpreter] {} finished after {} step(s)", who, steps.len());
                    return InterpreterOutcome {
                        final_answer: Some(answer),
                        steps,
                        success: true,
                        error: None,
                    };
                }
                Decision::Act {
                    thought,
                    action,
                    args,
                } => (thought, action, args),
            };

            let candidates = capabilities.get(&action);
            let observation = if candidates.is_empty() {
                format!(
                    "Unknown capability '{}'. Available: {}",
                    action,
                    capabilities.ids().join(", ")
                )
            } else {
                let inv =
                    invoke_candidates(&action, candidates, &args, ctx, self.config.call_timeout).await;
                if inv.outcome.success {
                    inv.outcome.output
                } else {
                    format!("Error: {}", inv.outcome.output)
                }
            };

            tracing::debug!("[Interpreter] {} step {}: {} -> {}", who, index, action, observation);

            messages.push(Message::assistant(reply));
            messages.push(Message::user(format!("Observation: {}", observation)));
            steps.push(ReactStep {
                thought,
                action,
                args,
                observation,
            });
        }

        tracing::warn!(
            "[Interpreter] {} exhausted {} step(s) without a final answer",
            who,
            self.config.max_steps
        );
        InterpreterOutcome {
            final_answer: None,
            steps,
            success: false,
            error: Some(format!("max steps ({}) exhausted", self.config.max_steps)),
        }
    }
}
