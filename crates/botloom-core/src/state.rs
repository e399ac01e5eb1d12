//! Shared engine state for the CLI and embedding hosts.

use std::sync::Arc;

use crate::builtin::{register_builtins, ReasonerCapability};
use crate::cache::{CompiledRuntime, RuntimeCache};
use crate::capability::{CapabilityRegistry, CapabilitySet};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::EngineError;
use crate::models::StepRequest;
use crate::pipeline::PipelineOrchestrator;
use crate::reasoner::{HttpReasoner, Reasoner};
use crate::store::{BotStore, RunStore};
use crate::workforce::WorkforceOrchestrator;

pub struct EngineStateInner {
    pub db: Database,
    pub bot_store: BotStore,
    pub run_store: RunStore,
    pub registry: Arc<CapabilityRegistry>,
    pub cache: RuntimeCache,
    pub config: EngineConfig,
    reasoner: Option<Arc<dyn Reasoner>>,
}

pub type EngineState = Arc<EngineStateInner>;

impl EngineStateInner {
    /// State with the memory and bus capabilities registered and no
    /// reasoner.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let registry = Arc::new(CapabilityRegistry::new());
        register_builtins(&registry);
        Self {
            bot_store: BotStore::new(db.clone()),
            run_store: RunStore::new(db.clone()),
            registry,
            cache: RuntimeCache::new(),
            config,
            db,
            reasoner: None,
        }
    }

    /// Install a reasoner and expose it as the `llm` capability.
    #[must_use]
    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.registry
            .register(Arc::new(ReasonerCapability::new(reasoner.clone())));
        self.reasoner = Some(reasoner);
        self
    }

    /// Install an [`HttpReasoner`] built from the configuration when an API
    /// key is present.
    pub fn with_configured_reasoner(self) -> Result<Self, EngineError> {
        if self.config.reasoner.api_key.is_none() {
            tracing::debug!("No reasoner API key configured; 'llm' capability disabled");
            return Ok(self);
        }
        let reasoner = HttpReasoner::new(self.config.reasoner.clone())
            .map_err(|e| EngineError::Config(e.to_string()))?;
        Ok(self.with_reasoner(Arc::new(reasoner)))
    }

    pub fn reasoner(&self) -> Option<Arc<dyn Reasoner>> {
        self.reasoner.clone()
    }

    pub fn pipeline(&self) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            self.bot_store.clone(),
            self.run_store.clone(),
            self.registry.clone(),
            self.config.pipeline(),
        )
    }

    /// A workforce orchestrator over every registered capability.
    ///
    /// `reasoner` overrides the installed one; `max_agents` overrides the
    /// configured role cap.
    pub fn workforce(
        &self,
        reasoner: Option<Arc<dyn Reasoner>>,
        max_agents: Option<usize>,
    ) -> Result<WorkforceOrchestrator, EngineError> {
        let reasoner = reasoner.or_else(|| self.reasoner.clone()).ok_or_else(|| {
            EngineError::Config(
                "workforce runs need a reasoner (set ANTHROPIC_AUTH_TOKEN or ANTHROPIC_API_KEY)"
                    .into(),
            )
        })?;
        let mut config = self.config.workforce();
        if let Some(max) = max_agents {
            config.max_agents = max;
        }
        Ok(WorkforceOrchestrator::new(
            reasoner,
            CapabilitySet::from_registry(&self.registry),
            config,
        ))
    }

    /// Compile `source` through the runtime cache under `key`.
    pub async fn compile(&self, key: &str, source: &str) -> Result<Arc<CompiledRuntime>, EngineError> {
        Ok(self.cache.get_or_compile(key, source).await?)
    }

    /// Pipeline steps for `event` of block `block` in the program cached
    /// under `key`.
    pub async fn event_steps(
        &self,
        key: &str,
        source: &str,
        block: &str,
        event: &str,
    ) -> Result<Vec<StepRequest>, EngineError> {
        let runtime = self.compile(key, source).await?;
        let block = runtime
            .program
            .find(block)
            .ok_or_else(|| EngineError::NotFound(format!("Block '{}' in {}", block, key)))?;
        block.pipeline_steps(event).ok_or_else(|| {
            EngineError::NotFound(format!("Block '{}' has no '{}' handler", block.name, event))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::ScriptedReasoner;

    const SOURCE: &str = "bot Greeter\n  on message\n    say \"hi\"\n    call memory.set key=\"k\" value=1\n  end\nend\n";

    fn state() -> EngineStateInner {
        EngineStateInner::new(Database::open_in_memory().unwrap(), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_event_steps_and_compile_errors() {
        let state = state();
        let steps = state
            .event_steps("greeter", SOURCE, "Greeter", "message")
            .await
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].capability_id, "memory.set");

        assert!(matches!(
            state.event_steps("greeter", SOURCE, "Greeter", "shutdown").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            state.compile("broken", "bot Open\n").await,
            Err(EngineError::Compile(e)) if e.line == 1
        ));
    }

    #[test]
    fn test_workforce_needs_a_reasoner() {
        let state = state();
        assert!(matches!(
            state.workforce(None, None),
            Err(EngineError::Config(_))
        ));
        let scripted: Arc<dyn Reasoner> = Arc::new(ScriptedReasoner::new(["{}"]));
        assert!(state.workforce(Some(scripted), Some(2)).is_ok());
    }
}
