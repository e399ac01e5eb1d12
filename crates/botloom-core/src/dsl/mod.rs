//! Bot program language: compiler and compiled program types.
//!
//! ```text
//! source text ──► compile() ──► Program ──► Block ──► EventHandler ──► Instruction
//! ```
//!
//! Compilation is pure and deterministic, which is what makes the
//! [`RuntimeCache`](crate::cache::RuntimeCache) safe.

pub mod compiler;
pub mod program;

pub use compiler::compile;
pub use program::{Block, BlockKind, CompileReport, EventHandler, Instruction, Op, Program};

/// A compilation failure at a specific source line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Line {line}: {message}")]
pub struct CompileError {
    /// 1-based line the cursor was on when compilation failed.
    pub line: usize,
    pub message: String,
}
