//! Built-in capabilities over shared memory, the broadcast bus and the
//! reasoner.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bus::{BroadcastBus, BusPayload};
use crate::capability::{arg_str, Args, Capability, CapabilityError, CapabilityRegistry, Outcome, ToolContext};
use crate::reasoner::{ReasonRequest, Reasoner};

/// Sender id used when a bus capability runs outside a named role.
const ANONYMOUS_SENDER: &str = "agent";

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn require_bus(ctx: &ToolContext, capability: &str) -> Result<BroadcastBus, CapabilityError> {
    ctx.bus.clone().ok_or_else(|| {
        CapabilityError::failed(format!(
            "{} is only available inside a workforce session",
            capability
        ))
    })
}

fn sender(ctx: &ToolContext) -> &str {
    ctx.role.as_deref().unwrap_or(ANONYMOUS_SENDER)
}

pub struct MemoryGet;

#[async_trait]
impl Capability for MemoryGet {
    fn name(&self) -> &str {
        "memory.get"
    }
    fn capability_id(&self) -> &str {
        "memory.get"
    }
    fn description(&self) -> &str {
        "Read a value from shared memory. Args: {\"key\": string}"
    }

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
        let key = arg_str(&args, "key")?;
        Ok(match ctx.memory.get(key).await {
            Some(value) => Outcome::success(render(&value)).with_data(value),
            None => Outcome::success(format!("No value stored under '{}'", key)),
        })
    }
}

pub struct MemorySet;

#[async_trait]
impl Capability for MemorySet {
    fn name(&self) -> &str {
        "memory.set"
    }
    fn capability_id(&self) -> &str {
        "memory.set"
    }
    fn description(&self) -> &str {
        "Store a value in shared memory. Args: {\"key\": string, \"value\": any}"
    }

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
        let key = arg_str(&args, "key")?;
        let value = args.get("value").cloned().unwrap_or(Value::Null);
        ctx.memory.set(key, value).await;
        Ok(Outcome::success(format!("Stored '{}'", key)))
    }
}

pub struct MemoryAppend;

#[async_trait]
impl Capability for MemoryAppend {
    fn name(&self) -> &str {
        "memory.append"
    }
    fn capability_id(&self) -> &str {
        "memory.append"
    }
    fn description(&self) -> &str {
        "Append a value to a list in shared memory. Args: {\"key\": string, \"value\": any}"
    }

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
        let key = arg_str(&args, "key")?;
        let value = args.get("value").cloned().unwrap_or(Value::Null);
        let len = ctx.memory.append(key, value).await;
        Ok(Outcome::success(format!("'{}' now has {} item(s)", key, len)).with_data(json!({ "length": len })))
    }
}

pub struct BusPost;

#[async_trait]
impl Capability for BusPost {
    fn name(&self) -> &str {
        "bus.post"
    }
    fn capability_id(&self) -> &str {
        "bus.post"
    }
    fn description(&self) -> &str {
        "Broadcast a message to the team. Args: {\"text\": string, \"to\"?: role name}"
    }

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
        let bus = require_bus(ctx, self.name())?;
        let text = arg_str(&args, "text")?.to_string();
        let to = args.get("to").and_then(|v| v.as_str()).map(str::to_string);
        let message = bus.post(sender(ctx), BusPayload::Message { text, to }).await;
        Ok(Outcome::success(format!("Posted message {}", message.id)))
    }
}

pub struct BusRead;

#[async_trait]
impl Capability for BusRead {
    fn name(&self) -> &str {
        "bus.read"
    }
    fn capability_id(&self) -> &str {
        "bus.read"
    }
    fn description(&self) -> &str {
        "Read team messages. Args: {\"from\"?: index of the first message}"
    }

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
        let bus = require_bus(ctx, self.name())?;
        let from = args.get("from").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let messages = bus.from_index(from).await;
        if messages.is_empty() {
            return Ok(Outcome::success("No messages"));
        }
        let lines: Vec<String> = messages
            .iter()
            .map(|m| match &m.payload {
                BusPayload::TaskAssignment { role, task } => {
                    format!("[{}] task for {}: {}", m.sender_role_id, role, task)
                }
                BusPayload::Message { text, to: Some(to) } => {
                    format!("[{}] to {}: {}", m.sender_role_id, to, text)
                }
                BusPayload::Message { text, to: None } => format!("[{}] {}", m.sender_role_id, text),
                BusPayload::RoleRequest { role_name, .. } => {
                    format!("[{}] requested role {}", m.sender_role_id, role_name)
                }
                BusPayload::Result { success, output } => format!(
                    "[{}] {}: {}",
                    m.sender_role_id,
                    if *success { "result" } else { "failed" },
                    output
                ),
            })
            .collect();
        Ok(Outcome::success(lines.join("\n")).with_data(&messages))
    }
}

pub struct BusRequestRole;

#[async_trait]
impl Capability for BusRequestRole {
    fn name(&self) -> &str {
        "bus.request_role"
    }
    fn capability_id(&self) -> &str {
        "bus.request_role"
    }
    fn description(&self) -> &str {
        "Ask the orchestrator to add a collaborator. Args: {\"role_name\": string, \"reason\"?: string}"
    }

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
        let bus = require_bus(ctx, self.name())?;
        let role_name = arg_str(&args, "role_name")
            .or_else(|_| arg_str(&args, "role"))?
            .trim()
            .to_string();
        if role_name.is_empty() {
            return Err(CapabilityError::InvalidArguments("role_name must not be empty".into()));
        }
        let reason = args.get("reason").and_then(|v| v.as_str()).map(str::to_string);
        bus.post(
            sender(ctx),
            BusPayload::RoleRequest {
                role_name: role_name.clone(),
                reason,
            },
        )
        .await;
        Ok(Outcome::success(format!("Requested role '{}'", role_name)))
    }
}

/// Wraps a [`Reasoner`] as the `llm` capability.
pub struct ReasonerCapability {
    reasoner: Arc<dyn Reasoner>,
}

impl ReasonerCapability {
    pub const ID: &'static str = "llm";

    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

#[async_trait]
impl Capability for ReasonerCapability {
    fn name(&self) -> &str {
        "llm.reasoner"
    }
    fn capability_id(&self) -> &str {
        Self::ID
    }
    fn description(&self) -> &str {
        "Ask the language model. Args: {\"prompt\": string}"
    }

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
        let prompt = arg_str(&args, "prompt").or_else(|_| arg_str(&args, "input"))?;
        let mut request = ReasonRequest::new(prompt);
        if let Some(system) = &ctx.metadata.system_prompt {
            request = request.with_system(system.clone());
        }
        self.reasoner
            .complete(request)
            .await
            .map(Outcome::success)
            .map_err(|e| CapabilityError::failed(e.to_string()))
    }
}

pub fn memory_capabilities() -> Vec<Arc<dyn Capability>> {
    vec![Arc::new(MemoryGet), Arc::new(MemorySet), Arc::new(MemoryAppend)]
}

pub fn bus_capabilities() -> Vec<Arc<dyn Capability>> {
    vec![Arc::new(BusPost), Arc::new(BusRead), Arc::new(BusRequestRole)]
}

/// Register the memory and bus capabilities.
pub fn register_builtins(registry: &CapabilityRegistry) {
    for tool in memory_capabilities().into_iter().chain(bus_capabilities()) {
        registry.register(tool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{args_from_input, RunMetadata};
    use crate::reasoner::ScriptedReasoner;

    fn ctx() -> ToolContext {
        ToolContext::new(RunMetadata::new("b1", "r1"))
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let ctx = ctx();
        MemorySet
            .run(args_from_input(&json!({"key": "k", "value": {"n": 1}})), &ctx)
            .await
            .unwrap();
        let got = MemoryGet
            .run(args_from_input(&json!({"key": "k"})), &ctx)
            .await
            .unwrap();
        assert_eq!(got.data, Some(json!({"n": 1})));

        let appended = MemoryAppend
            .run(args_from_input(&json!({"key": "k", "value": 2})), &ctx)
            .await
            .unwrap();
        assert_eq!(appended.data, Some(json!({"length": 2})));
    }

    #[tokio::test]
    async fn test_bus_capabilities_need_a_bus() {
        let err = BusPost
            .run(args_from_input(&json!({"text": "hi"})), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("workforce session"));
    }

    #[tokio::test]
    async fn test_request_role_posts_structured_message() {
        let bus = BroadcastBus::new();
        let ctx = ctx().with_bus(bus.clone()).for_role("Planner");
        BusRequestRole
            .run(args_from_input(&json!({"role_name": "Critic", "reason": "review"})), &ctx)
            .await
            .unwrap();

        let requests = bus.role_requests_since(0).await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].requested_by, "Planner");
        assert_eq!(requests[0].role_name, "Critic");

        let read = BusRead.run(Args::new(), &ctx).await.unwrap();
        assert_eq!(read.output, "[Planner] requested role Critic");
    }

    #[tokio::test]
    async fn test_reasoner_capability() {
        let llm = ReasonerCapability::new(Arc::new(ScriptedReasoner::new(["hello there"])));
        let out = llm
            .run(args_from_input(&json!("say hi")), &ctx())
            .await
            .unwrap();
        assert_eq!(out.output, "hello there");
        assert_eq!(llm.capability_id(), "llm");
    }

    #[test]
    fn test_register_builtins() {
        let registry = CapabilityRegistry::new();
        register_builtins(&registry);
        assert_eq!(registry.len(), 6);
        assert!(registry.contains("bus.request_role"));
    }
}
