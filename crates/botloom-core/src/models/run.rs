use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" | "pending" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" | "success" | "completed" => Some(Self::Succeeded),
            "failed" | "error" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One pipeline step: a capability id plus its input.
///
/// Ad-hoc requests name the capability `agentId`; both spellings deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    #[serde(alias = "agentId")]
    pub capability_id: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl StepRequest {
    pub fn new(capability_id: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            capability_id: capability_id.into(),
            input,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub bot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub steps: Vec<StepRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(id: String, bot_id: String, steps: Vec<StepRequest>) -> Self {
        Self {
            id,
            bot_id,
            version_id: None,
            triggered_by: None,
            status: RunStatus::Queued,
            steps,
            output: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptKind {
    /// Engine notes: skipped steps, rejected candidates, limits.
    System,
    /// A capability invocation is about to start.
    Attempt,
    /// A capability returned a successful outcome.
    Result,
    /// A capability failed, errored or timed out.
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub kind: TranscriptKind,
    /// 0-based index of the step this entry belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(kind: TranscriptKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            step: None,
            capability_id: None,
            tool: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(TranscriptKind::System, message)
    }

    pub fn at_step(mut self, step: usize, capability_id: &str) -> Self {
        self.step = Some(step);
        self.capability_id = Some(capability_id.to_string());
        self
    }

    pub fn with_tool(mut self, tool: &str) -> Self {
        self.tool = Some(tool.to_string());
        self
    }
}
