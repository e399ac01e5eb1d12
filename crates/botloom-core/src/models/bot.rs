use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A capability binding in a bot (or bot version) manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(alias = "id")]
    pub capability_id: String,
    /// `None` counts as enabled; only an explicit `false` disables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Concrete tool names bound to this capability, tried in order.
    /// Empty means "whatever the registry has under `capability_id`".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

impl ManifestEntry {
    pub fn new(capability_id: impl Into<String>) -> Self {
        Self {
            capability_id: capability_id.into(),
            enabled: None,
            tools: Vec::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }
}

/// Per-bot (or per-version) capability bindings, stored as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, capability_id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.capability_id == capability_id)
    }

    /// Capability ids whose entry is not explicitly disabled.
    pub fn enabled_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.is_enabled())
            .map(|e| e.capability_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_strategy: Option<String>,
    /// Pinned version; its fields take precedence over the bot's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bot {
    pub fn new(id: String, name: String, capabilities: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            capabilities,
            manifest: None,
            system_prompt: None,
            memory_strategy: None,
            version_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotVersion {
    pub id: String,
    pub bot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_strategy: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BotVersion {
    pub fn new(id: String, bot_id: String) -> Self {
        Self {
            id,
            bot_id,
            capabilities: None,
            manifest: None,
            system_prompt: None,
            memory_strategy: None,
            created_at: Utc::now(),
        }
    }
}

/// Effective configuration for one run: bot defaults overlaid with the
/// pinned version's fields.
#[derive(Debug, Clone, Default)]
pub struct ResolvedBot {
    pub bot_id: String,
    pub version_id: Option<String>,
    pub capabilities: Vec<String>,
    pub manifest: Manifest,
    pub system_prompt: Option<String>,
    pub memory_strategy: Option<String>,
}

impl ResolvedBot {
    pub fn resolve(bot: &Bot, version: Option<&BotVersion>) -> Self {
        let mut resolved = Self {
            bot_id: bot.id.clone(),
            version_id: None,
            capabilities: bot.capabilities.clone(),
            manifest: bot.manifest.clone().unwrap_or_default(),
            system_prompt: bot.system_prompt.clone(),
            memory_strategy: bot.memory_strategy.clone(),
        };

        if let Some(v) = version {
            resolved.version_id = Some(v.id.clone());
            if let Some(caps) = &v.capabilities {
                resolved.capabilities = caps.clone();
            }
            if let Some(manifest) = &v.manifest {
                resolved.manifest = manifest.clone();
            }
            if v.system_prompt.is_some() {
                resolved.system_prompt = v.system_prompt.clone();
            }
            if v.memory_strategy.is_some() {
                resolved.memory_strategy = v.memory_strategy.clone();
            }
        }

        resolved
    }

    /// Manifest entries that are not disabled, or the base capability list
    /// when there is no manifest.
    pub fn allowed_capabilities(&self) -> Vec<String> {
        if self.manifest.is_empty() {
            self.capabilities.clone()
        } else {
            self.manifest.enabled_ids()
        }
    }

    pub fn is_allowed(&self, capability_id: &str) -> bool {
        self.allowed_capabilities().iter().any(|c| c == capability_id)
    }
}
