use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use super::Capability;
use crate::models::Manifest;

/// Summary of a registered tool, for listings and prompts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    pub name: String,
    pub capability_id: String,
    pub description: String,
}

/// Registry of tool implementations keyed by capability id.
///
/// Tools registered under the same capability id become ordered candidates
/// for that id (registration order).
pub struct CapabilityRegistry {
    tools: RwLock<Vec<Arc<dyn Capability>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn Capability>>> {
        self.tools.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn Capability>>> {
        self.tools.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a tool. A tool with the same name replaces the old one in place.
    pub fn register(&self, tool: Arc<dyn Capability>) {
        let mut tools = self.write();
        match tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => tools[idx] = tool,
            None => tools.push(tool),
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.read().iter().find(|t| t.name() == name).cloned()
    }

    /// All tools implementing `capability_id`, in registration order.
    pub fn candidates(&self, capability_id: &str) -> Vec<Arc<dyn Capability>> {
        self.read()
            .iter()
            .filter(|t| t.capability_id() == capability_id)
            .cloned()
            .collect()
    }

    /// Candidates for `capability_id`, honoring a manifest's explicit tool
    /// list when one is given. Unknown tool names are skipped.
    pub fn resolve(&self, capability_id: &str, manifest: Option<&Manifest>) -> Vec<Arc<dyn Capability>> {
        let explicit = manifest
            .and_then(|m| m.entry(capability_id))
            .filter(|e| !e.tools.is_empty());

        match explicit {
            Some(entry) => entry
                .tools
                .iter()
                .filter_map(|name| {
                    let tool = self.get_tool(name);
                    if tool.is_none() {
                        tracing::warn!(
                            "[Registry] manifest names unknown tool '{}' for '{}'",
                            name,
                            capability_id
                        );
                    }
                    tool
                })
                .collect(),
            None => self.candidates(capability_id),
        }
    }

    pub fn contains(&self, capability_id: &str) -> bool {
        self.read().iter().any(|t| t.capability_id() == capability_id)
    }

    pub fn list(&self) -> Vec<CapabilityInfo> {
        self.read()
            .iter()
            .map(|t| CapabilityInfo {
                name: t.name().to_string(),
                capability_id: t.capability_id().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The capabilities visible to one interpreter or workforce session:
/// capability id → ordered candidates.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    order: Vec<String>,
    candidates: HashMap<String, Vec<Arc<dyn Capability>>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every capability currently in the registry.
    pub fn from_registry(registry: &CapabilityRegistry) -> Self {
        let mut set = Self::new();
        for info in registry.list() {
            if let Some(tool) = registry.get_tool(&info.name) {
                set.insert(tool);
            }
        }
        set
    }

    /// Only the listed capability ids, resolved through the manifest.
    pub fn allowed(registry: &CapabilityRegistry, ids: &[String], manifest: Option<&Manifest>) -> Self {
        let mut set = Self::new();
        for id in ids {
            let tools = registry.resolve(id, manifest);
            if tools.is_empty() {
                continue;
            }
            set.order.push(id.clone());
            set.candidates.insert(id.clone(), tools);
        }
        set
    }

    /// Append a tool as the last candidate for its capability id.
    pub fn insert(&mut self, tool: Arc<dyn Capability>) {
        let id = tool.capability_id().to_string();
        if !self.candidates.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.candidates.entry(id).or_default().push(tool);
    }

    pub fn get(&self, capability_id: &str) -> &[Arc<dyn Capability>] {
        self.candidates
            .get(capability_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// One `- id: description` line per capability, for reasoner prompts.
    pub fn describe(&self) -> String {
        self.order
            .iter()
            .filter_map(|id| {
                self.candidates
                    .get(id)
                    .and_then(|tools| tools.first())
                    .map(|t| format!("- {}: {}", id, t.description()))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Args, CapabilityError, Outcome, ToolContext};
    use crate::models::ManifestEntry;
    use async_trait::async_trait;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Capability for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn capability_id(&self) -> &str {
            self.1
        }
        fn description(&self) -> &str {
            "test tool"
        }
        async fn run(&self, _args: Args, _ctx: &ToolContext) -> Result<Outcome, CapabilityError> {
            Ok(Outcome::success(self.0))
        }
    }

    fn registry() -> CapabilityRegistry {
        let registry = CapabilityRegistry::new();
        registry.register(Arc::new(Named("bing", "search")));
        registry.register(Arc::new(Named("ddg", "search")));
        registry.register(Arc::new(Named("mailer", "email")));
        registry
    }

    #[test]
    fn test_candidates_in_registration_order() {
        let names: Vec<_> = registry()
            .candidates("search")
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["bing", "ddg"]);
    }

    #[test]
    fn test_register_same_name_replaces() {
        let registry = registry();
        registry.register(Arc::new(Named("bing", "web")));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.candidates("search").len(), 1);
        assert!(registry.contains("web"));
    }

    #[test]
    fn test_register_survives_poisoned_lock() {
        let registry = registry();
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = registry.tools.write().unwrap();
            panic!("writer panicked");
        }));
        assert!(poisoned.is_err());
        assert!(registry.tools.is_poisoned());

        registry.register(Arc::new(Named("smtp", "email")));
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.candidates("email").len(), 2);
    }

    #[test]
    fn test_manifest_tools_override_order() {
        let manifest = Manifest::new(vec![
            ManifestEntry::new("search").with_tools(["ddg", "missing", "bing"])
        ]);
        let names: Vec<_> = registry()
            .resolve("search", Some(&manifest))
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["ddg", "bing"]);
    }

    #[test]
    fn test_allowed_set_skips_unknown_ids() {
        let registry = registry();
        let set = CapabilitySet::allowed(&registry, &["email".into(), "nope".into()], None);
        assert_eq!(set.ids(), &["email".to_string()]);
        assert!(set.get("nope").is_empty());
        assert!(set.describe().contains("- email: test tool"));
    }
}
