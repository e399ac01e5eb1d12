//! Botloom core - bot program compiler and execution engine.
//!
//! ```text
//! source ─► dsl::compile ─► Program ─┬─► PipelineOrchestrator ─┐
//!                                    └─► WorkforceOrchestrator ─┤
//!                                          └─► StepInterpreter ─┤
//!                                                               ▼
//!                         CapabilityRegistry + SharedMemory (+ BroadcastBus)
//! ```
//!
//! Persistence, HTTP and presentation live outside this crate; the SQLite
//! adapter in [`db`]/[`store`] is the only storage it ships.

pub mod builtin;
pub mod bus;
pub mod cache;
pub mod capability;
pub mod config;
pub mod db;
pub mod dsl;
pub mod error;
pub mod interpreter;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod reasoner;
pub mod state;
pub mod store;
pub mod workforce;

pub use cache::{CompiledRuntime, RuntimeCache};
pub use capability::{Capability, CapabilityError, CapabilityRegistry, Outcome, ToolContext};
pub use config::EngineConfig;
pub use db::Database;
pub use error::EngineError;
pub use state::{EngineState, EngineStateInner};
