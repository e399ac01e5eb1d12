use serde::{Deserialize, Serialize};

use crate::bus::BroadcastBus;
use crate::memory::SharedMemory;

/// Identity of the run (or workforce session) a capability executes in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub bot_id: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_strategy: Option<String>,
}

impl RunMetadata {
    pub fn new(bot_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            run_id: run_id.into(),
            ..Default::default()
        }
    }
}

/// Per-run context handed by reference to every capability invocation.
///
/// Created fresh for each run or workforce session and dropped when it
/// ends. Cloning is cheap and shares the same memory and bus.
#[derive(Clone)]
pub struct ToolContext {
    pub metadata: RunMetadata,
    pub memory: SharedMemory,
    pub tenant: Option<String>,
    /// Broadcast log, present only inside a workforce session.
    pub bus: Option<BroadcastBus>,
    /// Workforce role the invocation is made on behalf of.
    pub role: Option<String>,
}

impl ToolContext {
    pub fn new(metadata: RunMetadata) -> Self {
        Self {
            metadata,
            memory: SharedMemory::new(),
            tenant: None,
            bus: None,
            role: None,
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    #[must_use]
    pub fn with_bus(mut self, bus: BroadcastBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// A view of this context acting as `role`; memory and bus are shared.
    pub fn for_role(&self, role: &str) -> Self {
        let mut ctx = self.clone();
        ctx.role = Some(role.to_string());
        ctx
    }
}
