//! Core error type for the Botloom engine.
//!
//! `EngineError` is returned by stores, orchestrators and the runtime cache.
//! Failures that happen *inside* a run (a capability erroring, timing out, or
//! not being allowed) never surface here; they are folded into the run
//! transcript instead.

use crate::dsl::CompileError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Step limit exceeded: {requested} steps requested, at most {limit} allowed")]
    StepLimitExceeded { requested: usize, limit: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the error is a schema mismatch reported by SQLite
    /// (a column or table the adapter expected is not there).
    pub fn is_schema_mismatch(&self) -> bool {
        match self {
            EngineError::Database(msg) => {
                msg.contains("no such column") || msg.contains("no such table")
            }
            _ => false,
        }
    }
}
