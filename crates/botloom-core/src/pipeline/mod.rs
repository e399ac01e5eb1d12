//! Pipeline Orchestrator - sequential single-bot execution.
//!
//! ```text
//! run ─► bot ─► pinned version? ─► ResolvedBot (allowed capabilities)
//!  │
//!  └─ for each step (in order, one at a time)
//!       not allowed      → system note, skip
//!       no candidates    → system note, skip
//!       otherwise        → candidates under per-call timeout
//!  └─ SuccessPolicy over step results → persisted terminal status
//! ```

mod orchestrator;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{RunStatus, TranscriptEntry};

pub use orchestrator::PipelineOrchestrator;

/// Upper bound on steps accepted for one run.
pub const MAX_PIPELINE_STEPS: usize = 25;

/// How step results map to the run's terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Succeeded when at least one step succeeded.
    #[default]
    AnySuccess,
    /// Succeeded only when every step succeeded.
    AllSucceeded,
}

impl SuccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnySuccess => "any_success",
            Self::AllSucceeded => "all_succeeded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "any_success" | "any" => Some(Self::AnySuccess),
            "all_succeeded" | "all" => Some(Self::AllSucceeded),
            _ => None,
        }
    }

    /// Terminal status for `succeeded` successes out of `total` steps.
    /// An empty pipeline never succeeds.
    pub fn evaluate(&self, succeeded: usize, total: usize) -> RunStatus {
        let ok = match self {
            Self::AnySuccess => succeeded > 0,
            Self::AllSucceeded => total > 0 && succeeded == total,
        };
        if ok {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bound on each capability call.
    pub step_timeout: Duration,
    pub max_steps: usize,
    pub policy: SuccessPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            max_steps: MAX_PIPELINE_STEPS,
            policy: SuccessPolicy::AnySuccess,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub index: usize,
    pub capability_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub status: StepStatus,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub run_id: String,
    pub bot_id: String,
    pub status: RunStatus,
    /// Output of the last successful step.
    pub output: Option<String>,
    pub steps: Vec<StepReport>,
    pub transcript: Vec<TranscriptEntry>,
}

impl PipelineOutcome {
    pub fn succeeded_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Succeeded)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_success_policy() {
        let policy = SuccessPolicy::AnySuccess;
        assert_eq!(policy.evaluate(1, 3), RunStatus::Succeeded);
        assert_eq!(policy.evaluate(0, 3), RunStatus::Failed);
        assert_eq!(policy.evaluate(0, 0), RunStatus::Failed);
    }

    #[test]
    fn test_all_succeeded_policy() {
        let policy = SuccessPolicy::AllSucceeded;
        assert_eq!(policy.evaluate(3, 3), RunStatus::Succeeded);
        assert_eq!(policy.evaluate(2, 3), RunStatus::Failed);
        assert_eq!(policy.evaluate(0, 0), RunStatus::Failed);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(SuccessPolicy::from_str("all-succeeded"), Some(SuccessPolicy::AllSucceeded));
        assert_eq!(SuccessPolicy::from_str("ANY"), Some(SuccessPolicy::AnySuccess));
        assert_eq!(SuccessPolicy::from_str("most"), None);
        let parsed: SuccessPolicy = serde_json::from_str("\"all_succeeded\"").unwrap();
        assert_eq!(parsed.as_str(), "all_succeeded");
    }
}
