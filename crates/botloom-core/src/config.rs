//! Engine configuration - YAML file plus environment overrides.
//!
//! ```yaml
//! step_timeout_secs: 30
//! max_pipeline_steps: 25
//! interpreter_max_steps: 8
//! workforce_max_agents: 5
//! success_policy: any_success      # or all_succeeded
//! reasoner:
//!   adapter: anthropic
//!   base_url: ${ANTHROPIC_BASE_URL:-https://api.anthropic.com}
//!   model: claude-sonnet-4-20250514
//!   max_tokens: 4096
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::pipeline::{PipelineConfig, SuccessPolicy, MAX_PIPELINE_STEPS};
use crate::reasoner::ReasonerConfig;
use crate::workforce::WorkforceConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub step_timeout_secs: u64,
    pub max_pipeline_steps: usize,
    pub interpreter_max_steps: usize,
    pub workforce_max_agents: usize,
    pub success_policy: SuccessPolicy,
    pub reasoner: ReasonerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 30,
            max_pipeline_steps: MAX_PIPELINE_STEPS,
            interpreter_max_steps: crate::interpreter::DEFAULT_MAX_STEPS,
            workforce_max_agents: crate::workforce::DEFAULT_MAX_AGENTS,
            success_policy: SuccessPolicy::AnySuccess,
            reasoner: ReasonerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse YAML. `${VAR}` and `${VAR:-default}` references are expanded
    /// first.
    pub fn from_yaml(yaml: &str) -> Result<Self, EngineError> {
        let config: Self = serde_yaml::from_str(&resolve_env_vars(yaml))
            .map_err(|e| EngineError::Config(format!("Failed to parse config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config file '{}': {}", path, e))
        })?;
        Self::from_yaml(&content)
    }

    /// The file at `path` when given, defaults otherwise; environment
    /// overrides applied on top.
    pub fn load(path: Option<&str>) -> Result<Self, EngineError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (the process environment in
    /// [`apply_env`](Self::apply_env)).
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BOTLOOM_STEP_TIMEOUT_SECS") {
            match v.trim().parse() {
                Ok(secs) => self.step_timeout_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid BOTLOOM_STEP_TIMEOUT_SECS={}", v),
            }
        }
        if let Some(v) = get("BOTLOOM_MAX_AGENTS") {
            match v.trim().parse() {
                Ok(n) => self.workforce_max_agents = n,
                Err(_) => tracing::warn!("Ignoring invalid BOTLOOM_MAX_AGENTS={}", v),
            }
        }
        if let Some(v) = get("BOTLOOM_SUCCESS_POLICY") {
            match SuccessPolicy::from_str(&v) {
                Some(policy) => self.success_policy = policy,
                None => tracing::warn!("Ignoring invalid BOTLOOM_SUCCESS_POLICY={}", v),
            }
        }
        if let Some(v) = get("ANTHROPIC_BASE_URL") {
            self.reasoner.base_url = v;
        }
        if let Some(v) = get("ANTHROPIC_MODEL") {
            self.reasoner.model = v;
        }
        if let Some(v) = get("ANTHROPIC_AUTH_TOKEN").or_else(|| get("ANTHROPIC_API_KEY")) {
            self.reasoner.api_key = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.step_timeout_secs == 0 {
            return Err(EngineError::Config("step_timeout_secs must be positive".into()));
        }
        if self.max_pipeline_steps == 0 || self.max_pipeline_steps > MAX_PIPELINE_STEPS {
            return Err(EngineError::Config(format!(
                "max_pipeline_steps must be between 1 and {}",
                MAX_PIPELINE_STEPS
            )));
        }
        if self.interpreter_max_steps == 0 {
            return Err(EngineError::Config("interpreter_max_steps must be positive".into()));
        }
        if self.workforce_max_agents == 0 {
            return Err(EngineError::Config("workforce_max_agents must be positive".into()));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            step_timeout: self.step_timeout(),
            max_steps: self.max_pipeline_steps,
            policy: self.success_policy,
        }
    }

    pub fn workforce(&self) -> WorkforceConfig {
        WorkforceConfig {
            max_agents: self.workforce_max_agents,
            interpreter_max_steps: self.interpreter_max_steps,
            call_timeout: Some(self.step_timeout()),
        }
    }
}

fn env_ref_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").ok()).as_ref()
}

/// Expand `${VAR}` and `${VAR:-default}`. Unset variables without a
/// default are left as written.
pub fn resolve_env_vars(input: &str) -> String {
    let Some(re) = env_ref_re() else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let expr = &caps[1];
        match expr.split_once(":-") {
            Some((name, default)) => std::env::var(name).unwrap_or_else(|_| default.to_string()),
            None => std::env::var(expr).unwrap_or_else(|_| format!("${{{}}}", expr)),
        }
    })
    .to_string()
}
