use std::sync::Arc;

use crate::capability::{args_from_input, invoke_candidates, CapabilityRegistry, RunMetadata, ToolContext};
use crate::error::EngineError;
use crate::models::{
    ResolvedBot, Run, RunStatus, StepRequest, TranscriptEntry, TranscriptKind,
};
use crate::store::{BotStore, RunStore};

use super::{PipelineConfig, PipelineOutcome, StepReport, StepStatus};

/// Executes persisted runs step by step against the capability registry.
pub struct PipelineOrchestrator {
    bots: BotStore,
    runs: RunStore,
    registry: Arc<CapabilityRegistry>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        bots: BotStore,
        runs: RunStore,
        registry: Arc<CapabilityRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            bots,
            runs,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Create a run for `bot_id` from an explicit step list and execute it.
    /// Oversized requests are rejected before anything is persisted.
    pub async fn run_adhoc(
        &self,
        bot_id: &str,
        steps: Vec<StepRequest>,
        triggered_by: Option<&str>,
    ) -> Result<PipelineOutcome, EngineError> {
        self.check_step_limit(steps.len())?;

        let bot = self
            .bots
            .get(bot_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Bot {}", bot_id)))?;

        let mut run = Run::new(uuid::Uuid::new_v4().to_string(), bot.id.clone(), steps);
        run.version_id = bot.version_id.clone();
        run.triggered_by = triggered_by.map(str::to_string);
        self.runs.create(&run).await?;

        tracing::info!(
            "[Pipeline] Created ad-hoc run {} for bot {} ({} steps)",
            run.id,
            bot.id,
            run.steps.len()
        );
        self.execute_run(&run.id).await
    }

    /// Execute a persisted run and write back its terminal status.
    pub async fn execute_run(&self, run_id: &str) -> Result<PipelineOutcome, EngineError> {
        let run = self
            .runs
            .get(run_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Run {}", run_id)))?;

        if run.status.is_terminal() {
            return Err(EngineError::BadRequest(format!(
                "Run {} already finished ({})",
                run.id,
                run.status.as_str()
            )));
        }

        if let Err(e) = self.check_step_limit(run.steps.len()) {
            let note = TranscriptEntry::system(e.to_string());
            self.runs
                .finish(&run.id, RunStatus::Failed, None, &[note])
                .await?;
            return Err(e);
        }

        let Some(resolved) = self.resolve(&run).await? else {
            let note = TranscriptEntry::system(format!("Bot {} not found", run.bot_id));
            self.runs
                .finish(&run.id, RunStatus::Failed, None, &[note])
                .await?;
            return Err(EngineError::NotFound(format!("Bot {}", run.bot_id)));
        };

        if !self.runs.mark_running(&run.id).await? {
            return Err(EngineError::BadRequest(format!(
                "Run {} is already being executed",
                run.id
            )));
        }

        let ctx = ToolContext::new(RunMetadata {
            bot_id: resolved.bot_id.clone(),
            run_id: run.id.clone(),
            user_id: run.triggered_by.clone(),
            version_id: resolved.version_id.clone(),
            system_prompt: resolved.system_prompt.clone(),
            memory_strategy: resolved.memory_strategy.clone(),
        });

        let outcome = self.execute_steps(&run, &resolved, &ctx).await;

        if let Err(e) = self
            .runs
            .finish(
                &run.id,
                outcome.status,
                outcome.output.as_deref(),
                &outcome.transcript,
            )
            .await
        {
            tracing::error!(
                "[Pipeline] Could not persist run {} (computed {}, output {:?}): {}",
                run.id,
                outcome.status.as_str(),
                outcome.output,
                e
            );
            if let Err(mark_err) = self.runs.mark_failed(&run.id).await {
                tracing::error!("[Pipeline] Could not mark run {} failed: {}", run.id, mark_err);
            }
            return Err(e);
        }

        tracing::info!(
            "[Pipeline] Run {} finished: {} ({}/{} steps succeeded)",
            run.id,
            outcome.status.as_str(),
            outcome.succeeded_steps(),
            run.steps.len()
        );
        Ok(outcome)
    }

    fn check_step_limit(&self, requested: usize) -> Result<(), EngineError> {
        if requested > self.config.max_steps {
            return Err(EngineError::StepLimitExceeded {
                requested,
                limit: self.config.max_steps,
            });
        }
        Ok(())
    }

    /// Bot plus its pinned version (run pin first, then the bot's own).
    /// A missing version degrades to the bot's fields.
    async fn resolve(&self, run: &Run) -> Result<Option<ResolvedBot>, EngineError> {
        let Some(bot) = self.bots.get(&run.bot_id).await? else {
            return Ok(None);
        };

        let pin = run.version_id.clone().or_else(|| bot.version_id.clone());
        let version = match pin {
            Some(version_id) => {
                let version = self.bots.get_version(&version_id).await?;
                if version.is_none() {
                    tracing::warn!(
                        "[Pipeline] Version {} of bot {} not found, using bot defaults",
                        version_id,
                        bot.id
                    );
                }
                version.filter(|v| v.bot_id == bot.id)
            }
            None => None,
        };

        Ok(Some(ResolvedBot::resolve(&bot, version.as_ref())))
    }

    async fn execute_steps(
        &self,
        run: &Run,
        resolved: &ResolvedBot,
        ctx: &ToolContext,
    ) -> PipelineOutcome {
        let mut transcript = Vec::new();
        let mut reports = Vec::with_capacity(run.steps.len());
        let mut succeeded = 0;
        let mut output = None;

        for (index, step) in run.steps.iter().enumerate() {
            let cap = step.capability_id.as_str();

            if !resolved.is_allowed(cap) {
                tracing::warn!("[Pipeline] Step {} skipped: '{}' is not enabled", index, cap);
                transcript.push(
                    TranscriptEntry::system(format!(
                        "Capability '{}' is not enabled for this bot; step skipped",
                        cap
                    ))
                    .at_step(index, cap),
                );
                reports.push(skipped(index, cap, "not enabled"));
                continue;
            }

            let candidates = self.registry.resolve(cap, Some(&resolved.manifest));
            if candidates.is_empty() {
                tracing::warn!("[Pipeline] Step {} skipped: no implementation for '{}'", index, cap);
                transcript.push(
                    TranscriptEntry::system(format!(
                        "No implementation registered for capability '{}'; step skipped",
                        cap
                    ))
                    .at_step(index, cap),
                );
                reports.push(skipped(index, cap, "not available"));
                continue;
            }

            let args = args_from_input(&step.input);
            let inv = invoke_candidates(cap, &candidates, &args, ctx, Some(self.config.step_timeout)).await;

            for (n, rejected) in inv.rejected.iter().enumerate() {
                transcript.push(
                    TranscriptEntry::new(TranscriptKind::Attempt, format!("Invoking '{}'", rejected.tool))
                        .at_step(index, cap)
                        .with_tool(&rejected.tool),
                );
                let next = if n + 1 < candidates.len() {
                    "trying next candidate"
                } else {
                    "no candidates left"
                };
                tracing::warn!(
                    "[Pipeline] Step {} candidate '{}' failed: {}",
                    index,
                    rejected.tool,
                    rejected.error
                );
                transcript.push(
                    TranscriptEntry::system(format!(
                        "Candidate '{}' for '{}' failed: {}; {}",
                        rejected.tool, cap, rejected.error, next
                    ))
                    .at_step(index, cap)
                    .with_tool(&rejected.tool),
                );
            }

            if let Some(tool) = &inv.tool {
                transcript.push(
                    TranscriptEntry::new(TranscriptKind::Attempt, format!("Invoking '{}'", tool))
                        .at_step(index, cap)
                        .with_tool(tool),
                );
            }

            let status = if inv.outcome.success {
                succeeded += 1;
                output = Some(inv.outcome.output.clone());
                StepStatus::Succeeded
            } else {
                StepStatus::Failed
            };

            let kind = match status {
                StepStatus::Succeeded => TranscriptKind::Result,
                _ => TranscriptKind::Failure,
            };
            let mut entry = TranscriptEntry::new(kind, inv.outcome.output.clone()).at_step(index, cap);
            if let Some(tool) = &inv.tool {
                entry = entry.with_tool(tool);
            }
            transcript.push(entry);

            reports.push(StepReport {
                index,
                capability_id: cap.to_string(),
                tool: inv.tool,
                status,
                output: inv.outcome.output,
            });
        }

        let status = self.config.policy.evaluate(succeeded, run.steps.len());
        if run.steps.is_empty() {
            transcript.push(TranscriptEntry::system("Run has no steps"));
        }

        PipelineOutcome {
            run_id: run.id.clone(),
            bot_id: run.bot_id.clone(),
            status,
            output,
            steps: reports,
            transcript,
        }
    }
}

fn skipped(index: usize, cap: &str, why: &str) -> StepReport {
    StepReport {
        index,
        capability_id: cap.to_string(),
        tool: None,
        status: StepStatus::Skipped,
        output: why.to_string(),
    }
}
