use std::sync::Arc;

use futures_util::future::join_all;

use crate::builtin::{bus_capabilities, memory_capabilities};
use crate::bus::{BusPayload, ORCHESTRATOR};
use crate::capability::{CapabilitySet, ToolContext};
use crate::interpreter::{InterpreterConfig, StepInterpreter};
use crate::reasoner::{ReasonRequest, Reasoner};

use super::plan::{parse_plan, planner_prompt, Plan, PlannedRole};
use super::{
    Iteration, ProgressCallback, RoleOutput, WorkforceConfig, WorkforceOutcome, MAX_ITERATIONS,
};

/// Plans a request into roles and runs them in bounded iterations.
pub struct WorkforceOrchestrator {
    reasoner: Arc<dyn Reasoner>,
    interpreter: StepInterpreter,
    capabilities: CapabilitySet,
    config: WorkforceConfig,
    progress: Option<ProgressCallback>,
}

impl WorkforceOrchestrator {
    /// `capabilities` is the set shared by every role. The memory and bus
    /// capabilities are added when missing.
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        capabilities: CapabilitySet,
        config: WorkforceConfig,
    ) -> Self {
        let mut capabilities = capabilities;
        for tool in memory_capabilities().into_iter().chain(bus_capabilities()) {
            if capabilities.get(tool.capability_id()).is_empty() {
                capabilities.insert(tool);
            }
        }

        let interpreter = StepInterpreter::new(
            reasoner.clone(),
            InterpreterConfig {
                max_steps: config.interpreter_max_steps,
                call_timeout: config.call_timeout,
            },
        );

        Self {
            reasoner,
            interpreter,
            capabilities,
            config,
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Run a workforce session for `request`. The context's bus is used
    /// when present, otherwise a fresh one is created for the session.
    pub async fn run(&self, request: &str, ctx: &ToolContext) -> WorkforceOutcome {
        let request = request.trim();
        if request.is_empty() {
            return WorkforceOutcome::failed(request, "request must not be empty");
        }

        let bus = ctx.bus.clone().unwrap_or_default();
        let ctx = ctx.clone().with_bus(bus.clone());
        let max_agents = self.config.max_agents.max(1);

        let plan = self.plan(request, &ctx).await;
        tracing::info!(
            "[Workforce] Planned {} role(s){}",
            plan.roles.len(),
            if plan.fallback { " (fallback)" } else { "" }
        );

        let mut active: Vec<PlannedRole> = Vec::new();
        let mut newly: Vec<PlannedRole> = plan.roles.clone();
        let mut iterations = Vec::new();

        for index in 1..=MAX_ITERATIONS {
            for role in &newly {
                bus.post(
                    ORCHESTRATOR,
                    BusPayload::TaskAssignment {
                        role: role.name.clone(),
                        task: role.task.clone(),
                    },
                )
                .await;
            }
            active.append(&mut newly);

            let mark = bus.len().await;
            let outputs = self.run_roles(request, &active, index, &ctx).await;

            for out in &outputs {
                bus.post(
                    &out.role,
                    BusPayload::Result {
                        success: out.success,
                        output: out
                            .final_answer
                            .clone()
                            .or_else(|| out.error.clone())
                            .unwrap_or_default(),
                    },
                )
                .await;
            }

            for req in bus.role_requests_since(mark).await {
                match admission(&active, &newly, &req.role_name, max_agents) {
                    Admission::Known => continue,
                    Admission::OverCap => {
                        tracing::warn!(
                            "[Workforce] Ignoring request for '{}' from {}: {} agents max",
                            req.role_name,
                            req.requested_by,
                            max_agents
                        );
                        continue;
                    }
                    Admission::Admit => {}
                }
                tracing::info!(
                    "[Workforce] {} requested collaborator '{}'",
                    req.requested_by,
                    req.role_name
                );
                newly.push(requested_role(
                    request,
                    &req.role_name,
                    &req.requested_by,
                    req.reason.as_deref(),
                ));
            }

            let iteration = Iteration {
                index,
                roles: active.iter().map(|r| r.name.clone()).collect(),
                outputs,
                requested_roles: newly.iter().map(|r| r.name.clone()).collect(),
            };
            if let Some(progress) = &self.progress {
                progress(&iteration);
            }
            iterations.push(iteration);

            if newly.is_empty() {
                break;
            }
            if index == MAX_ITERATIONS {
                tracing::warn!(
                    "[Workforce] Iteration limit reached; {} requested role(s) not started",
                    newly.len()
                );
            }
        }

        WorkforceOutcome {
            success: true,
            request: request.to_string(),
            plan,
            iterations,
            messages: bus.all().await,
            error: None,
        }
    }

    async fn plan(&self, request: &str, ctx: &ToolContext) -> Plan {
        let max_agents = self.config.max_agents.max(1);
        let mut system = planner_prompt(max_agents);
        if !self.capabilities.is_empty() {
            system.push_str("\n\nCapabilities every role can use:\n");
            system.push_str(&self.capabilities.describe());
        }
        if let Some(prompt) = ctx.metadata.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            system = format!("{}\n\n{}", prompt, system);
        }

        match self
            .reasoner
            .complete(ReasonRequest::new(request).with_system(system))
            .await
        {
            Ok(reply) => parse_plan(&reply, request, max_agents).unwrap_or_else(|| {
                tracing::warn!("[Workforce] Could not parse plan, using a single general role");
                Plan::general(request)
            }),
            Err(e) => {
                tracing::warn!("[Workforce] Planning failed ({}), using a single general role", e);
                Plan::general(request)
            }
        }
    }

    async fn run_roles(
        &self,
        request: &str,
        roles: &[PlannedRole],
        iteration: usize,
        ctx: &ToolContext,
    ) -> Vec<RoleOutput> {
        let runs = roles.iter().map(|role| {
            let role_ctx = ctx.for_role(&role.name);
            let goal = role_goal(request, role, iteration);
            async move {
                let outcome = self.interpreter.run(&goal, &self.capabilities, &role_ctx).await;
                RoleOutput {
                    role: role.name.clone(),
                    task: role.task.clone(),
                    success: outcome.success,
                    final_answer: outcome.final_answer,
                    steps: outcome.steps.len(),
                    error: outcome.error,
                }
            }
        });
        join_all(runs).await
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Admission {
    Admit,
    /// Already active or already requested this iteration.
    Known,
    OverCap,
}

fn admission(
    active: &[PlannedRole],
    newly: &[PlannedRole],
    name: &str,
    max_agents: usize,
) -> Admission {
    let known = active
        .iter()
        .chain(newly.iter())
        .any(|r| r.name.eq_ignore_ascii_case(name));
    if known {
        Admission::Known
    } else if active.len() + newly.len() >= max_agents {
        Admission::OverCap
    } else {
        Admission::Admit
    }
}

fn role_goal(request: &str, role: &PlannedRole, iteration: usize) -> String {
    let mut goal = format!(
        "Team request: {}\n\nYour role: {}\nYour task: {}",
        request, role.name, role.task
    );
    if let Some(description) = &role.description {
        goal.push_str(&format!("\nRole description: {}", description));
    }
    if iteration > 1 {
        goal.push_str(&format!(
            "\n\nThis is round {} of the collaboration. Use bus.read to see what the team has posted so far.",
            iteration
        ));
    }
    goal
}

fn requested_role(request: &str, name: &str, requested_by: &str, reason: Option<&str>) -> PlannedRole {
    let task = match reason {
        Some(reason) if !reason.trim().is_empty() => format!(
            "{} asked for your help: {}. Contribute to: {}",
            requested_by, reason, request
        ),
        _ => format!("{} asked for your help. Contribute to: {}", requested_by, request),
    };
    PlannedRole {
        name: name.to_string(),
        description: None,
        task,
    }
}
