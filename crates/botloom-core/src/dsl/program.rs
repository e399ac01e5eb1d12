//! Compiled program types.
//!
//! A [`Program`] serializes to a JSON array of blocks, the interchange
//! format between the compiler and any tooling (`botloom compile` dumps it):
//!
//! ```json
//! [
//!   {
//!     "kind": "bot",
//!     "name": "Greeter",
//!     "description": "Says hello",
//!     "events": [
//!       {
//!         "name": "start",
//!         "instructions": [
//!           { "kind": "say", "text": "hi", "command": "say", "rawArguments": "\"hi\"", "sourceLine": 4 }
//!         ]
//!       }
//!     ]
//!   }
//! ]
//! ```

use serde::{Deserialize, Serialize};

use crate::models::StepRequest;

/// An ordered list of blocks, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    pub blocks: Vec<Block>,
}

impl Program {
    /// Find a block by name.
    pub fn find(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Bot,
    Agent,
    Function,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Agent => "agent",
            Self::Function => "function",
        }
    }

    /// Map a block-opening keyword to its kind.
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "bot" => Some(Self::Bot),
            "agent" => Some(Self::Agent),
            "function" => Some(Self::Function),
            _ => None,
        }
    }
}

/// A named bot, agent or function with its event handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub kind: BlockKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Event handlers in source order. Names are unique within a block.
    #[serde(default)]
    pub events: Vec<EventHandler>,
}

impl Block {
    pub fn event(&self, name: &str) -> Option<&EventHandler> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Turn the `call` instructions of an event into pipeline steps.
    ///
    /// Returns `None` when the block has no handler for `event`.
    pub fn pipeline_steps(&self, event: &str) -> Option<Vec<StepRequest>> {
        let handler = self.event(event)?;
        Some(
            handler
                .instructions
                .iter()
                .filter_map(|inst| match &inst.op {
                    Op::Call { capability, args } => Some(StepRequest {
                        capability_id: capability.clone(),
                        input: serde_json::Value::Object(args.clone()),
                    }),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Capability ids referenced by `call` instructions across all events,
    /// first occurrence first.
    pub fn declared_capabilities(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for inst in self.events.iter().flat_map(|e| e.instructions.iter()) {
            if let Op::Call { capability, .. } = &inst.op {
                if !seen.contains(capability) {
                    seen.push(capability.clone());
                }
            }
        }
        seen
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHandler {
    pub name: String,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

/// One parsed instruction line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    #[serde(flatten)]
    pub op: Op,
    /// The leading keyword as written in source.
    pub command: String,
    /// Everything after the keyword, trimmed.
    pub raw_arguments: String,
    /// 1-based line number in the source text.
    pub source_line: usize,
}

/// The recognized instruction set. Anything else is kept as [`Op::Raw`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Op {
    /// `say "<text>"`
    Say { text: String },
    /// `call <capability> [{json} | key=value ...]`
    Call {
        capability: String,
        #[serde(default)]
        args: serde_json::Map<String, serde_json::Value>,
    },
    /// `remember <key> = <value>`
    Remember {
        key: String,
        value: serde_json::Value,
    },
    /// `ask "<prompt>"`
    Ask { prompt: String },
    /// Unrecognized instruction, preserved verbatim in `command`/`raw_arguments`.
    Raw,
}

impl Op {
    pub fn kind(&self) -> &'static str {
        match self {
            Op::Say { .. } => "say",
            Op::Call { .. } => "call",
            Op::Remember { .. } => "remember",
            Op::Ask { .. } => "ask",
            Op::Raw => "raw",
        }
    }
}

/// JSON-friendly compile result: `{success, blocks, error?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileReport {
    pub success: bool,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Program, super::CompileError>> for CompileReport {
    fn from(result: Result<Program, super::CompileError>) -> Self {
        match result {
            Ok(program) => Self {
                success: true,
                blocks: program.blocks,
                error: None,
            },
            Err(e) => Self {
                success: false,
                blocks: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}
