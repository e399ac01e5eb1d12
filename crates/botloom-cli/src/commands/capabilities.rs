use botloom_core::state::EngineState;
use serde_json::{json, Value};

use super::to_json;

/// Every registered tool, grouped under its capability id.
pub fn list(state: &EngineState) -> Result<Value, String> {
    let tools = state.registry.list();
    Ok(json!({ "tools": to_json(&tools)?, "count": tools.len() }))
}
