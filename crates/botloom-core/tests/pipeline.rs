//! End-to-end pipeline runs against an in-memory database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use botloom_core::capability::{Args, Capability, CapabilityError, CapabilityRegistry, Outcome, ToolContext};
use botloom_core::models::{
    Bot, BotVersion, Manifest, ManifestEntry, Run, RunStatus, StepRequest, TranscriptKind,
};
use botloom_core::pipeline::{PipelineConfig, PipelineOrchestrator, StepStatus, SuccessPolicy};
use botloom_core::store::{BotStore, RunStore};
use botloom_core::{Database, EngineError};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Decline,
    Fail,
    Hang,
}

struct FakeTool {
    name: &'static str,
    capability: &'static str,
    behavior: Behavior,
}

fn tool(name: &'static str, capability: &'static str, behavior: Behavior) -> Arc<dyn Capability> {
    Arc::new(FakeTool {
        name,
        capability,
        behavior,
    })
}

#[async_trait]
impl Capability for FakeTool {
    fn name(&self) -> &str {
        self.name
    }

    fn capability_id(&self) -> &str {
        self.capability
    }

    fn description(&self) -> &str {
        "fake"
    }

    async fn run(&self, args: Args, ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
        match self.behavior {
            Behavior::Succeed => {
                ctx.memory.append("calls", json!(self.name)).await;
                let q = args.get("q").and_then(|v| v.as_str()).unwrap_or("-");
                Ok(Outcome::success(format!("{}:{}", self.name, q)))
            }
            Behavior::Decline => Ok(Outcome::failure(format!("{} declined", self.name))),
            Behavior::Fail => Err(CapabilityError::failed(format!("{} exploded", self.name))),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

struct Harness {
    db: Database,
    bots: BotStore,
    runs: RunStore,
    registry: Arc<CapabilityRegistry>,
}

impl Harness {
    fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        Self {
            bots: BotStore::new(db.clone()),
            runs: RunStore::new(db.clone()),
            registry: Arc::new(CapabilityRegistry::new()),
            db,
        }
    }

    async fn bot(&self, capabilities: &[&str]) -> Bot {
        let bot = Bot::new(
            "bot-1".into(),
            "Helper".into(),
            capabilities.iter().map(|c| c.to_string()).collect(),
        );
        self.bots.save(&bot).await.unwrap();
        bot
    }

    fn orchestrator(&self, config: PipelineConfig) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            self.bots.clone(),
            self.runs.clone(),
            self.registry.clone(),
            config,
        )
    }
}

fn step(capability: &str, q: &str) -> StepRequest {
    StepRequest::new(capability, json!({ "q": q }))
}

#[tokio::test]
async fn test_second_candidate_used_after_first_fails() {
    let h = Harness::new();
    h.bot(&["search"]).await;
    h.registry.register(tool("first", "search", Behavior::Fail));
    h.registry.register(tool("second", "search", Behavior::Succeed));

    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc("bot-1", vec![step("search", "rust")], Some("test"))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.output.as_deref(), Some("second:rust"));
    assert_eq!(outcome.steps[0].tool.as_deref(), Some("second"));

    let notes: Vec<_> = outcome
        .transcript
        .iter()
        .filter(|e| e.kind == TranscriptKind::System)
        .collect();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].tool.as_deref(), Some("first"));
    assert!(notes[0].message.contains("first exploded"));
    assert!(!outcome
        .transcript
        .iter()
        .any(|e| e.kind == TranscriptKind::Failure));

    let persisted = h.runs.get(&outcome.run_id).await.unwrap().unwrap();
    assert_eq!(persisted.status, RunStatus::Succeeded);
    assert_eq!(persisted.output.as_deref(), Some("second:rust"));
    assert_eq!(persisted.triggered_by.as_deref(), Some("test"));
    assert!(persisted.finished_at.is_some());
    assert_eq!(
        h.runs.transcript(&outcome.run_id).await.unwrap().len(),
        outcome.transcript.len()
    );
}

#[tokio::test]
async fn test_one_success_out_of_three_succeeds() {
    let h = Harness::new();
    h.bot(&["a", "b", "c"]).await;
    h.registry.register(tool("ta", "a", Behavior::Fail));
    h.registry.register(tool("tb", "b", Behavior::Succeed));
    h.registry.register(tool("tc", "c", Behavior::Decline));

    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc(
            "bot-1",
            vec![step("a", "1"), step("b", "2"), step("c", "3")],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.succeeded_steps(), 1);
    assert_eq!(outcome.output.as_deref(), Some("tb:2"));
    let statuses: Vec<_> = outcome.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Failed, StepStatus::Succeeded, StepStatus::Failed]
    );
}

#[tokio::test]
async fn test_all_steps_failing_fails_the_run() {
    let h = Harness::new();
    h.bot(&["a", "b"]).await;
    h.registry.register(tool("ta", "a", Behavior::Fail));
    h.registry.register(tool("tb", "b", Behavior::Decline));

    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc("bot-1", vec![step("a", "1"), step("b", "2")], None)
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.output.is_none());
    let persisted = h.runs.get(&outcome.run_id).await.unwrap().unwrap();
    assert_eq!(persisted.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_all_succeeded_policy() {
    let h = Harness::new();
    h.bot(&["a", "b"]).await;
    h.registry.register(tool("ta", "a", Behavior::Succeed));
    h.registry.register(tool("tb", "b", Behavior::Decline));

    let outcome = h
        .orchestrator(PipelineConfig {
            policy: SuccessPolicy::AllSucceeded,
            ..Default::default()
        })
        .run_adhoc("bot-1", vec![step("a", "1"), step("b", "2")], None)
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.output.as_deref(), Some("ta:1"));
}

#[tokio::test]
async fn test_oversized_request_rejected_before_execution() {
    let h = Harness::new();
    h.bot(&["a"]).await;
    h.registry.register(tool("ta", "a", Behavior::Succeed));

    let steps: Vec<_> = (0..26).map(|i| step("a", &i.to_string())).collect();
    let err = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc("bot-1", steps, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::StepLimitExceeded {
            requested: 26,
            limit: 25
        }
    ));
    assert!(h.runs.list_by_bot("bot-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persisted_oversized_run_is_failed() {
    let h = Harness::new();
    h.bot(&["a"]).await;
    let steps: Vec<_> = (0..26).map(|i| step("a", &i.to_string())).collect();
    h.runs
        .create(&Run::new("run-big".into(), "bot-1".into(), steps))
        .await
        .unwrap();

    let err = h
        .orchestrator(PipelineConfig::default())
        .execute_run("run-big")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StepLimitExceeded { .. }));
    let run = h.runs.get("run-big").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_hanging_capability_times_out_and_run_continues() {
    let h = Harness::new();
    h.bot(&["slow", "fast"]).await;
    h.registry.register(tool("sleeper", "slow", Behavior::Hang));
    h.registry.register(tool("runner", "fast", Behavior::Succeed));

    let config = PipelineConfig {
        step_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        h.orchestrator(config)
            .run_adhoc("bot-1", vec![step("slow", "1"), step("fast", "2")], None),
    )
    .await
    .expect("pipeline blocked past the step timeout")
    .unwrap();

    assert_eq!(outcome.steps[0].status, StepStatus::Failed);
    assert!(outcome.steps[0].output.contains("Timed out"));
    assert_eq!(outcome.steps[1].status, StepStatus::Succeeded);
    assert_eq!(outcome.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_disabled_and_unknown_capabilities_are_skipped() {
    let h = Harness::new();
    let mut bot = h.bot(&[]).await;
    bot.manifest = Some(Manifest::new(vec![
        ManifestEntry::new("search"),
        ManifestEntry::new("email").disabled(),
        ManifestEntry::new("translate"),
    ]));
    h.bots.save(&bot).await.unwrap();
    h.registry.register(tool("engine", "search", Behavior::Succeed));
    h.registry.register(tool("mailer", "email", Behavior::Succeed));

    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc(
            "bot-1",
            vec![step("email", "x"), step("translate", "y"), step("search", "z")],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.steps[0].status, StepStatus::Skipped);
    assert_eq!(outcome.steps[1].status, StepStatus::Skipped);
    assert_eq!(outcome.steps[2].status, StepStatus::Succeeded);
    let notes: Vec<_> = outcome
        .transcript
        .iter()
        .filter(|e| e.kind == TranscriptKind::System)
        .map(|e| e.message.as_str())
        .collect();
    assert!(notes[0].contains("not enabled"));
    assert!(notes[1].contains("No implementation"));
    assert_eq!(outcome.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_manifest_tool_order_overrides_registry() {
    let h = Harness::new();
    let mut bot = h.bot(&[]).await;
    bot.manifest = Some(Manifest::new(vec![
        ManifestEntry::new("search").with_tools(["backup", "primary"])
    ]));
    h.bots.save(&bot).await.unwrap();
    h.registry.register(tool("primary", "search", Behavior::Succeed));
    h.registry.register(tool("backup", "search", Behavior::Succeed));

    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc("bot-1", vec![step("search", "q")], None)
        .await
        .unwrap();
    assert_eq!(outcome.output.as_deref(), Some("backup:q"));
}

#[tokio::test]
async fn test_pinned_version_overrides_bot() {
    let h = Harness::new();
    h.bot(&["search"]).await;
    let mut version = BotVersion::new("v1".into(), "bot-1".into());
    version.capabilities = Some(vec!["email".into()]);
    version.system_prompt = Some("version prompt".into());
    h.bots.save_version(&version).await.unwrap();
    h.bots.set_version("bot-1", Some("v1")).await.unwrap();
    h.registry.register(tool("engine", "search", Behavior::Succeed));
    h.registry.register(tool("mailer", "email", Behavior::Succeed));

    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc("bot-1", vec![step("search", "a"), step("email", "b")], None)
        .await
        .unwrap();

    assert_eq!(outcome.steps[0].status, StepStatus::Skipped);
    assert_eq!(outcome.steps[1].status, StepStatus::Succeeded);
    let run = h.runs.get(&outcome.run_id).await.unwrap().unwrap();
    assert_eq!(run.version_id.as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_missing_version_degrades_to_bot_defaults() {
    let h = Harness::new();
    h.bot(&["search"]).await;
    h.bots.set_version("bot-1", Some("gone")).await.unwrap();
    h.registry.register(tool("engine", "search", Behavior::Succeed));

    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc("bot-1", vec![step("search", "a")], None)
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_legacy_bot_schema_runs_with_base_capabilities() {
    let h = Harness::new();
    h.bot(&["search"]).await;
    h.db
        .execute_batch(
            "ALTER TABLE bots DROP COLUMN manifest;
             ALTER TABLE bots DROP COLUMN system_prompt;
             ALTER TABLE bots DROP COLUMN memory_strategy;
             DROP TABLE bot_versions;",
        )
        .unwrap();
    h.registry.register(tool("engine", "search", Behavior::Succeed));

    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc("bot-1", vec![step("search", "old")], None)
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.output.as_deref(), Some("engine:old"));
}

#[tokio::test]
async fn test_finished_runs_are_not_reexecuted() {
    let h = Harness::new();
    h.bot(&["a"]).await;
    h.registry.register(tool("ta", "a", Behavior::Succeed));
    let orchestrator = h.orchestrator(PipelineConfig::default());

    let outcome = orchestrator
        .run_adhoc("bot-1", vec![step("a", "1")], None)
        .await
        .unwrap();
    let err = orchestrator.execute_run(&outcome.run_id).await.unwrap_err();
    assert!(matches!(err, EngineError::BadRequest(_)));
}

#[tokio::test]
async fn test_running_run_is_claimed_once() {
    let h = Harness::new();
    h.bot(&["a"]).await;
    h.registry.register(tool("ta", "a", Behavior::Succeed));
    let run = Run::new("run-1".into(), "bot-1".into(), vec![step("a", "1")]);
    h.runs.create(&run).await.unwrap();
    assert!(h.runs.mark_running("run-1").await.unwrap());

    let err = h
        .orchestrator(PipelineConfig::default())
        .execute_run("run-1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadRequest(_)));
    let persisted = h.runs.get("run-1").await.unwrap().unwrap();
    assert_eq!(persisted.status, RunStatus::Running);
}

#[tokio::test]
async fn test_unpersistable_result_marks_run_failed() {
    let h = Harness::new();
    h.bot(&["a"]).await;
    h.registry.register(tool("ta", "a", Behavior::Succeed));
    h.db.execute_batch(
        "CREATE TRIGGER reject_output BEFORE UPDATE OF output ON runs
         WHEN NEW.output IS NOT NULL
         BEGIN SELECT RAISE(ABORT, 'output rejected'); END;",
    )
    .unwrap();

    let run = Run::new("run-1".into(), "bot-1".into(), vec![step("a", "1")]);
    h.runs.create(&run).await.unwrap();
    let err = h
        .orchestrator(PipelineConfig::default())
        .execute_run("run-1")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Database(_)));
    let persisted = h.runs.get("run-1").await.unwrap().unwrap();
    assert_eq!(persisted.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_unknown_bot_and_run() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(PipelineConfig::default());
    assert!(matches!(
        orchestrator.run_adhoc("nope", vec![], None).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        orchestrator.execute_run("nope").await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_empty_pipeline_fails() {
    let h = Harness::new();
    h.bot(&["a"]).await;
    let outcome = h
        .orchestrator(PipelineConfig::default())
        .run_adhoc("bot-1", vec![], None)
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.steps.is_empty());
}
