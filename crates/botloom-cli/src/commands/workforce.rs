//! `botloom workforce`: plan a request into roles and run them.

use std::sync::Arc;

use botloom_core::capability::{RunMetadata, ToolContext};
use botloom_core::reasoner::{Reasoner, ScriptedReasoner};
use botloom_core::state::EngineState;
use botloom_core::workforce::Iteration;
use serde_json::Value;

use super::to_json;

pub struct WorkforceArgs<'a> {
    pub request: &'a str,
    pub max_agents: Option<usize>,
    /// JSON file with scripted reasoner replies, for offline runs.
    pub script: Option<&'a str>,
    pub tenant: Option<&'a str>,
    /// Report each finished iteration on stderr.
    pub progress: bool,
}

pub async fn run(state: &EngineState, args: WorkforceArgs<'_>) -> Result<Value, String> {
    let scripted: Option<Arc<dyn Reasoner>> = match args.script {
        Some(path) => {
            let raw = super::read_source(path)?;
            Some(Arc::new(
                ScriptedReasoner::from_json(&raw).map_err(|e| format!("{}: {}", path, e))?,
            ))
        }
        None => None,
    };

    let mut orchestrator = state
        .workforce(scripted, args.max_agents)
        .map_err(|e| e.to_string())?;
    if args.progress {
        orchestrator = orchestrator.with_progress(Arc::new(|it: &Iteration| {
            eprintln!(
                "iteration {}: {} role(s), {} requested",
                it.index,
                it.roles.len(),
                it.requested_roles.len()
            );
        }));
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let mut ctx = ToolContext::new(RunMetadata::new("workforce", session_id));
    if let Some(tenant) = args.tenant {
        ctx = ctx.with_tenant(tenant);
    }
    let outcome = orchestrator.run(args.request, &ctx).await;
    if let Some(err) = &outcome.error {
        return Err(err.clone());
    }
    to_json(&outcome)
}
