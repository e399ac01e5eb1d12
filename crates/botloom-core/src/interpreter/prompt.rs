//! Reasoner protocol for the ReAct loop: prompt assembly and reply parsing.

use serde_json::Value;

use crate::capability::{args_from_input, Args, CapabilitySet, ToolContext};
use crate::reasoner::strip_code_fence;

const PROTOCOL: &str = r#"You work by calling capabilities one at a time.
Reply with exactly one JSON object and nothing else.

To call a capability:
{"thought": "<why>", "action": "<capability id>", "args": { ... }}

When you are done:
{"thought": "<why>", "final_answer": "<answer>"}"#;

/// What the reasoner decided for the next step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Act {
        thought: Option<String>,
        action: String,
        args: Args,
    },
    Finish {
        thought: Option<String>,
        answer: String,
    },
}

/// Build the system prompt from the run's own prompt, the acting role and
/// the available capabilities.
pub fn system_prompt(ctx: &ToolContext, capabilities: &CapabilitySet) -> String {
    let mut parts = Vec::new();
    if let Some(prompt) = ctx.metadata.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        parts.push(prompt.to_string());
    }
    if let Some(role) = &ctx.role {
        parts.push(format!("You are acting as the \"{}\" role of a team.", role));
    }
    parts.push(PROTOCOL.to_string());
    if capabilities.is_empty() {
        parts.push("No capabilities are available; answer directly.".to_string());
    } else {
        parts.push(format!("Available capabilities:\n{}", capabilities.describe()));
    }
    parts.join("\n\n")
}

/// Parse a reasoner reply. Anything that is not a recognizable JSON
/// decision is taken as the final answer verbatim.
pub fn parse_decision(reply: &str) -> Decision {
    let body = strip_code_fence(reply);
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) else {
        return Decision::Finish {
            thought: None,
            answer: reply.trim().to_string(),
        };
    };

    let thought = obj
        .get("thought")
        .and_then(|t| t.as_str())
        .map(str::to_string);

    if let Some(answer) = obj.get("final_answer") {
        return Decision::Finish {
            thought,
            answer: match answer {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        };
    }

    match obj.get("action").and_then(|a| a.as_str()) {
        Some(action) if !action.trim().is_empty() => Decision::Act {
            thought,
            action: action.trim().to_string(),
            args: obj.get("args").map(args_from_input).unwrap_or_default(),
        },
        _ => Decision::Finish {
            thought,
            answer: body.to_string(),
        },
    }
}
