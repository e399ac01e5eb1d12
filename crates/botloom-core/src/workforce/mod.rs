//! Workforce Orchestrator - multi-role iterative execution.
//!
//! A free-text request is planned into roles, every active role runs its
//! own step interpreter concurrently, and roles coordinate through the
//! broadcast bus and shared memory. Roles may ask for collaborators with a
//! `RoleRequest`; those join in the next iteration.
//!
//! ```text
//! plan ─► iteration 1: assign tasks → run roles ∥ → scan requests
//!           └─ new roles? ─► iteration 2 … (at most MAX_ITERATIONS)
//! ```

mod orchestrator;
pub mod plan;

use std::sync::Arc;

use serde::Serialize;

use crate::bus::BroadcastMessage;

pub use orchestrator::WorkforceOrchestrator;
pub use plan::{parse_plan, Plan, PlannedRole};

/// Name of the single fallback role used when planning fails.
pub const GENERAL_AGENT: &str = "General Agent";

/// Hard bound on orchestration iterations.
pub const MAX_ITERATIONS: usize = 3;

pub const DEFAULT_MAX_AGENTS: usize = 5;

/// Called after every iteration, in order.
pub type ProgressCallback = Arc<dyn Fn(&Iteration) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct WorkforceConfig {
    /// Upper bound on concurrently active roles, including requested ones.
    pub max_agents: usize,
    /// Bound on each role's reason/act loop.
    pub interpreter_max_steps: usize,
    pub call_timeout: Option<std::time::Duration>,
}

impl Default for WorkforceConfig {
    fn default() -> Self {
        Self {
            max_agents: DEFAULT_MAX_AGENTS,
            interpreter_max_steps: crate::interpreter::DEFAULT_MAX_STEPS,
            call_timeout: Some(std::time::Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleOutput {
    pub role: String,
    pub task: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    pub steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    /// 1-based.
    pub index: usize,
    pub roles: Vec<String>,
    pub outputs: Vec<RoleOutput>,
    /// Roles added for the next iteration.
    pub requested_roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkforceOutcome {
    pub success: bool,
    pub request: String,
    pub plan: Plan,
    pub iterations: Vec<Iteration>,
    pub messages: Vec<BroadcastMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkforceOutcome {
    pub(crate) fn failed(request: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            request: request.to_string(),
            plan: Plan::default(),
            iterations: Vec::new(),
            messages: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Every role that took part, in order of first appearance.
    pub fn all_roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        for it in &self.iterations {
            for r in &it.roles {
                if !roles.contains(r) {
                    roles.push(r.clone());
                }
            }
        }
        roles
    }
}
