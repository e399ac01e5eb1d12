//! `botloom compile` / `botloom validate`: compile a program file.

use botloom_core::dsl::{compile, CompileReport};
use serde_json::{json, Value};

use super::{read_source, to_json};

/// Compile `file` and return the full report (`{success, blocks, error?}`).
/// A compile error is reported in the JSON, not as a command failure.
pub fn compile_file(file: &str) -> Result<Value, String> {
    let source = read_source(file)?;
    let report = CompileReport::from(compile(&source));
    to_json(&report)
}

/// Compile `file` and return a short summary; fails on a compile error.
pub fn validate(file: &str) -> Result<Value, String> {
    let source = read_source(file)?;
    let program = compile(&source).map_err(|e| format!("{}: {}", file, e))?;

    let blocks: Vec<Value> = program
        .blocks
        .iter()
        .map(|b| {
            json!({
                "kind": b.kind.as_str(),
                "name": b.name,
                "events": b.events.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
                "capabilities": b.declared_capabilities(),
            })
        })
        .collect();

    Ok(json!({ "valid": true, "file": file, "blocks": blocks }))
}
