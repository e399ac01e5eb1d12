//! `botloom bot`: register and inspect bots.

use botloom_core::models::Bot;
use botloom_core::state::EngineState;
use serde_json::{json, Value};

use super::to_json;

/// Create a bot from a compiled block. The bot's allowed capabilities are
/// the ones the block calls.
pub async fn create(
    state: &EngineState,
    file: &str,
    block_name: &str,
    id: Option<&str>,
    system_prompt: Option<&str>,
) -> Result<Value, String> {
    let source = super::read_source(file)?;
    let runtime = state
        .compile(file, &source)
        .await
        .map_err(|e| format!("{}: {}", file, e))?;
    let block = runtime
        .program
        .find(block_name)
        .ok_or_else(|| format!("Block '{}' not found in {}", block_name, file))?;

    let id = id
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut bot = Bot::new(id, block.name.clone(), block.declared_capabilities());
    bot.system_prompt = system_prompt.map(str::to_string);

    state
        .bot_store
        .save(&bot)
        .await
        .map_err(|e| format!("Failed to save bot: {}", e))?;
    tracing::info!("Created bot {} ({})", bot.id, bot.name);
    to_json(&bot)
}

pub async fn list(state: &EngineState) -> Result<Value, String> {
    let bots = state
        .bot_store
        .list()
        .await
        .map_err(|e| format!("Failed to list bots: {}", e))?;
    Ok(json!({ "bots": to_json(&bots)?, "count": bots.len() }))
}

pub async fn get(state: &EngineState, bot_id: &str) -> Result<Value, String> {
    match state.bot_store.get(bot_id).await {
        Ok(Some(bot)) => to_json(&bot),
        Ok(None) => Err(format!("Bot '{}' not found", bot_id)),
        Err(e) => Err(format!("Failed to load bot: {}", e)),
    }
}

pub async fn delete(state: &EngineState, bot_id: &str) -> Result<Value, String> {
    match state.bot_store.delete(bot_id).await {
        Ok(true) => {
            tracing::info!("Deleted bot {}", bot_id);
            Ok(json!({ "deleted": bot_id }))
        }
        Ok(false) => Err(format!("Bot '{}' not found", bot_id)),
        Err(e) => Err(format!("Failed to delete bot: {}", e)),
    }
}
