//! Capability invocation contract.
//!
//! A capability is an externally implemented unit of work. The engine only
//! knows its identity and calls [`Capability::run`]; it never inspects the
//! payload beyond [`Outcome`]'s `success`/`output`/`data`.
//!
//! ```text
//! step { capabilityId: "search" }
//!   → manifest entry? ──► tools ["bing", "ddg"]      (ordered candidates)
//!   → no entry       ──► registry.candidates("search")
//!   → try each: Ok(outcome) ⇒ accept | Err / timeout ⇒ note, next
//! ```

pub mod context;
pub mod invoke;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use context::{RunMetadata, ToolContext};
pub use invoke::{invoke_candidates, CandidateAttempt, Invocation};
pub use registry::{CapabilityInfo, CapabilityRegistry, CapabilitySet};

/// Arguments passed to a capability.
pub type Args = serde_json::Map<String, serde_json::Value>;

/// The result of one capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Outcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

impl From<CapabilityError> for Outcome {
    fn from(err: CapabilityError) -> Self {
        Outcome::failure(err.to_string())
    }
}

/// Errors a capability (or the invocation around it) can produce.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Capability '{0}' is not available")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl CapabilityError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// A pluggable tool implementation.
///
/// Several tools may share one `capability_id`; they are then tried in
/// order as candidates.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Concrete tool name, unique within a registry.
    fn name(&self) -> &str;

    /// The capability this tool implements.
    fn capability_id(&self) -> &str;

    /// Human/LLM readable description.
    fn description(&self) -> &str;

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError>;
}

/// Coerce a step input into capability arguments: objects pass through,
/// `null` becomes empty, anything else is wrapped as `{"input": ...}`.
pub fn args_from_input(input: &serde_json::Value) -> Args {
    match input {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => Args::new(),
        other => {
            let mut args = Args::new();
            args.insert("input".to_string(), other.clone());
            args
        }
    }
}

/// Read a string argument.
pub fn arg_str<'a>(args: &'a Args, key: &str) -> Result<&'a str, CapabilityError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CapabilityError::InvalidArguments(format!("missing '{}' argument", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_from_input() {
        assert_eq!(args_from_input(&json!({"a": 1}))["a"], 1);
        assert!(args_from_input(&json!(null)).is_empty());
        assert_eq!(args_from_input(&json!("cats"))["input"], "cats");
    }

    #[test]
    fn test_error_converts_to_failed_outcome() {
        let outcome: Outcome = CapabilityError::failed("boom").into();
        assert!(!outcome.success);
        assert_eq!(outcome.output, "boom");
    }

    #[test]
    fn test_arg_str() {
        let args = args_from_input(&json!({"key": "k", "n": 1}));
        assert_eq!(arg_str(&args, "key").unwrap(), "k");
        assert!(matches!(
            arg_str(&args, "n"),
            Err(CapabilityError::InvalidArguments(_))
        ));
    }
}
