//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command. Commands return
//! the JSON they want printed; `main` does the printing.

pub mod bot;
pub mod capabilities;
pub mod compile;
pub mod run;
pub mod workforce;

use std::sync::Arc;

use botloom_core::state::{EngineState, EngineStateInner};
use botloom_core::{Database, EngineConfig};

/// Open the database, load configuration and build the engine state.
pub fn build_state(db_path: &str, config_path: Option<&str>) -> Result<EngineState, String> {
    let config = EngineConfig::load(config_path).map_err(|e| e.to_string())?;
    let db = Database::open(db_path)
        .map_err(|e| format!("Failed to open database '{}': {}", db_path, e))?;
    let inner = EngineStateInner::new(db, config)
        .with_configured_reasoner()
        .map_err(|e| e.to_string())?;
    Ok(Arc::new(inner))
}

/// Like [`build_state`], but exits the process on failure.
pub fn init_state(db_path: &str, config_path: Option<&str>) -> EngineState {
    build_state(db_path, config_path).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    })
}

pub fn read_source(path: &str) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize output: {}", e))
}
