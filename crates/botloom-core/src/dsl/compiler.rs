//! Single-pass, line-oriented compiler for bot programs.
//!
//! ```text
//! # comments start with '#' or '//'
//! bot "Support Bot"
//!   description "Answers tickets"
//!   on message
//!     say "Looking into it"
//!     call search query="refund policy" limit=3
//!     call llm {"prompt": "Summarize the results"}
//!     remember last_topic = "refunds"
//!   end
//! end
//! ```
//!
//! `end` closes the innermost open scope: the open event if there is one,
//! otherwise the open block. Lines inside an event that do not start with a
//! known keyword are kept as `raw` instructions.

use serde_json::{Map, Value};

use super::program::{Block, BlockKind, EventHandler, Instruction, Op, Program};
use super::CompileError;

/// Compile program source into a [`Program`].
///
/// The first error aborts compilation; no partial program is returned.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    Compiler::default().run(source)
}

/// A block that has been opened but not yet closed.
struct OpenBlock {
    kind: BlockKind,
    name: String,
    description: Option<String>,
    events: Vec<EventHandler>,
    opened_at: usize,
}

#[derive(Default)]
struct Compiler {
    /// 1-based line currently being parsed.
    cursor: usize,
    blocks: Vec<Block>,
    block: Option<OpenBlock>,
    /// The currently open event, or `None` when in block scope.
    event: Option<EventHandler>,
}

impl Compiler {
    fn run(mut self, source: &str) -> Result<Program, CompileError> {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);

        for (idx, line) in source.lines().enumerate() {
            self.cursor = idx + 1;
            self.step(line.trim()).map_err(|message| CompileError {
                line: self.cursor,
                message,
            })?;
        }

        if let Some(block) = &self.block {
            let message = match &self.event {
                Some(event) => format!(
                    "Unterminated event '{}' in {} '{}' (missing 'end')",
                    event.name,
                    block.kind.as_str(),
                    block.name
                ),
                None => format!(
                    "Unterminated {} '{}' opened on line {} (missing 'end')",
                    block.kind.as_str(),
                    block.name,
                    block.opened_at
                ),
            };
            return Err(CompileError {
                line: self.cursor.max(1),
                message,
            });
        }

        tracing::debug!("[Compiler] Compiled {} block(s)", self.blocks.len());
        Ok(Program {
            blocks: self.blocks,
        })
    }

    fn step(&mut self, line: &str) -> Result<(), String> {
        if line.is_empty() || is_comment(line) {
            return Ok(());
        }

        let (keyword, rest) = split_keyword(line);

        if self.event.is_some() {
            return match keyword {
                "end" => self.close_event(rest),
                _ => {
                    let inst = parse_instruction(keyword, rest, self.cursor)?;
                    if let Some(event) = self.event.as_mut() {
                        event.instructions.push(inst);
                    }
                    Ok(())
                }
            };
        }

        if self.block.is_some() {
            return match keyword {
                "description" => self.set_description(rest),
                "on" => self.open_event(rest),
                "end" => self.close_block(rest),
                kw if BlockKind::from_keyword(kw).is_some() => Err(format!(
                    "Cannot open '{}' inside another block; close it with 'end' first",
                    kw
                )),
                other => Err(format!(
                    "Unexpected '{}' in block scope; expected 'description', 'on' or 'end'",
                    other
                )),
            };
        }

        match BlockKind::from_keyword(keyword) {
            Some(kind) => self.open_block(kind, rest),
            None if keyword == "end" => Err("Unexpected 'end' with no open block".to_string()),
            None => Err(format!("Unexpected '{}' outside of a block", keyword)),
        }
    }

    fn open_block(&mut self, kind: BlockKind, rest: &str) -> Result<(), String> {
        if rest.is_empty() {
            return Err(format!("Expected a name after '{}'", kind.as_str()));
        }
        let (name, trailing) = parse_word_or_string(rest)?;
        if name.trim().is_empty() {
            return Err(format!("{} name must not be empty", kind.as_str()));
        }
        expect_end_of_line(trailing)?;

        self.block = Some(OpenBlock {
            kind,
            name,
            description: None,
            events: Vec::new(),
            opened_at: self.cursor,
        });
        Ok(())
    }

    fn set_description(&mut self, rest: &str) -> Result<(), String> {
        if rest.is_empty() {
            return Err("Expected a quoted string after 'description'".to_string());
        }
        let (text, trailing) = parse_word_or_string(rest)?;
        expect_end_of_line(trailing)?;
        if let Some(block) = self.block.as_mut() {
            block.description = Some(text);
        }
        Ok(())
    }

    fn open_event(&mut self, rest: &str) -> Result<(), String> {
        if rest.is_empty() {
            return Err("Expected an event name after 'on'".to_string());
        }
        let (name, trailing) = parse_word_or_string(rest)?;
        if name.is_empty() {
            return Err("Event name must not be empty".to_string());
        }
        expect_end_of_line(trailing)?;

        if let Some(block) = &self.block {
            if block.events.iter().any(|e| e.name == name) {
                return Err(format!(
                    "Duplicate event '{}' in {} '{}'",
                    name,
                    block.kind.as_str(),
                    block.name
                ));
            }
        }

        self.event = Some(EventHandler {
            name,
            instructions: Vec::new(),
        });
        Ok(())
    }

    fn close_event(&mut self, rest: &str) -> Result<(), String> {
        expect_end_of_line(rest)?;
        if let (Some(event), Some(block)) = (self.event.take(), self.block.as_mut()) {
            block.events.push(event);
        }
        Ok(())
    }

    fn close_block(&mut self, rest: &str) -> Result<(), String> {
        expect_end_of_line(rest)?;
        if let Some(open) = self.block.take() {
            self.blocks.push(Block {
                kind: open.kind,
                name: open.name,
                description: open.description,
                events: open.events,
            });
        }
        Ok(())
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("//")
}

/// Split a trimmed line into its leading keyword and the trimmed remainder.
fn split_keyword(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], line[idx..].trim()),
        None => (line, ""),
    }
}

fn expect_end_of_line(rest: &str) -> Result<(), String> {
    let rest = rest.trim();
    if rest.is_empty() || is_comment(rest) {
        Ok(())
    } else {
        Err(format!("Unexpected trailing input: {}", rest))
    }
}

fn parse_instruction(keyword: &str, rest: &str, line: usize) -> Result<Instruction, String> {
    let op = match keyword {
        "say" => {
            if rest.is_empty() {
                return Err("'say' expects a message".to_string());
            }
            Op::Say {
                text: parse_text(rest)?,
            }
        }
        "ask" => {
            if rest.is_empty() {
                return Err("'ask' expects a prompt".to_string());
            }
            Op::Ask {
                prompt: parse_text(rest)?,
            }
        }
        "call" => {
            let (capability, args) = split_keyword(rest);
            if capability.is_empty() {
                return Err("'call' expects a capability id".to_string());
            }
            Op::Call {
                capability: capability.to_string(),
                args: parse_call_args(args)?,
            }
        }
        "remember" => {
            let (key, value) = rest
                .split_once('=')
                .ok_or_else(|| "'remember' expects '<key> = <value>'".to_string())?;
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(format!("Invalid memory key '{}'", key));
            }
            Op::Remember {
                key: key.to_string(),
                value: parse_value(value.trim())?,
            }
        }
        _ => Op::Raw,
    };

    Ok(Instruction {
        op,
        command: keyword.to_string(),
        raw_arguments: rest.to_string(),
        source_line: line,
    })
}

/// A quoted string must span the rest of the line; bare text is taken as-is.
fn parse_text(rest: &str) -> Result<String, String> {
    if rest.starts_with('"') {
        let (text, trailing) = parse_quoted(rest)?;
        expect_end_of_line(trailing)?;
        Ok(text)
    } else {
        Ok(rest.to_string())
    }
}

fn parse_call_args(input: &str) -> Result<Map<String, Value>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Map::new());
    }

    if input.starts_with('{') {
        return match serde_json::from_str::<Value>(input) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err("Call arguments must be a JSON object".to_string()),
            Err(e) => Err(format!("Invalid JSON call arguments: {}", e)),
        };
    }

    let mut args = Map::new();
    for token in split_tokens(input)? {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value argument, found '{}'", token))?;
        if key.is_empty() {
            return Err(format!("Missing argument name in '{}'", token));
        }
        args.insert(key.to_string(), parse_value(value)?);
    }
    Ok(args)
}

/// Parse an argument value: quoted string, JSON literal, or bare string.
fn parse_value(raw: &str) -> Result<Value, String> {
    if raw.starts_with('"') {
        let (text, trailing) = parse_quoted(raw)?;
        expect_end_of_line(trailing)?;
        return Ok(Value::String(text));
    }
    if raw.starts_with('{') || raw.starts_with('[') {
        return serde_json::from_str(raw).map_err(|e| format!("Invalid JSON value: {}", e));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => Ok(v),
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Split on whitespace outside double quotes.
fn split_tokens(input: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err("Unterminated string literal".to_string());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parse either a quoted string or a single bare word.
fn parse_word_or_string(input: &str) -> Result<(String, &str), String> {
    if input.starts_with('"') {
        parse_quoted(input)
    } else {
        let (word, rest) = split_keyword(input);
        Ok((word.to_string(), rest))
    }
}

/// Parse a double-quoted string starting at `input[0]`, returning the
/// unescaped contents and the remainder after the closing quote.
fn parse_quoted(input: &str) -> Result<(String, &str), String> {
    let mut out = String::new();
    let mut chars = input.char_indices().skip(1);

    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((out, &input[idx + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c => out.push(c),
        }
    }

    Err("Unterminated string literal".to_string())
}
