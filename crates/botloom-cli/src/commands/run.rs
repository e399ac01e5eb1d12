//! `botloom run` / `botloom run-status`: execute an event handler as a
//! pipeline and inspect persisted runs.

use botloom_core::models::RunStatus;
use botloom_core::state::EngineState;
use serde_json::{json, Value};

use super::to_json;

/// Options for `botloom run`.
pub struct RunArgs<'a> {
    pub bot_id: &'a str,
    pub file: &'a str,
    pub event: &'a str,
    /// Block to take the handler from; defaults to the block named like
    /// the bot.
    pub block: Option<&'a str>,
    pub triggered_by: Option<&'a str>,
}

/// Compile the program, turn the event's `call` instructions into steps and
/// run them against the bot. A failed run is returned as `Ok`; callers
/// decide on the exit code from `status`.
pub async fn run(state: &EngineState, args: RunArgs<'_>) -> Result<Value, String> {
    let bot = state
        .bot_store
        .get(args.bot_id)
        .await
        .map_err(|e| format!("Failed to load bot: {}", e))?
        .ok_or_else(|| format!("Bot '{}' not found", args.bot_id))?;

    let source = super::read_source(args.file)?;
    let block_name = args.block.unwrap_or(&bot.name);
    let steps = state
        .event_steps(args.file, &source, block_name, args.event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(
        "Running '{}' on bot {} ({} steps)",
        args.event,
        bot.id,
        steps.len()
    );
    let outcome = state
        .pipeline()
        .run_adhoc(&bot.id, steps, args.triggered_by)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&outcome)
}

/// A persisted run with its transcript.
pub async fn status(state: &EngineState, run_id: &str) -> Result<Value, String> {
    let run = state
        .run_store
        .get(run_id)
        .await
        .map_err(|e| format!("Failed to load run: {}", e))?
        .ok_or_else(|| format!("Run '{}' not found", run_id))?;
    let transcript = state
        .run_store
        .transcript(run_id)
        .await
        .map_err(|e| format!("Failed to load transcript: {}", e))?;

    Ok(json!({
        "run": to_json(&run)?,
        "transcript": to_json(&transcript)?,
    }))
}

/// Whether a `run` / `run-status` result describes a failed run.
pub fn is_failed(result: &Value) -> bool {
    let status = result
        .get("status")
        .or_else(|| result.get("run").and_then(|r| r.get("status")));
    status.and_then(Value::as_str) == Some(RunStatus::Failed.as_str())
}
