//! Goal library: the set of compiled goals available to start runs from.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::compiler::{CompiledGoal, GoalCompiler, GoalDefinition};
use crate::registry::ItemRegistry;
use crate::types::{GoalError, ResourceId, Result};

/// Outcome of a library reload.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Goals compiled successfully
    pub loaded: Vec<ResourceId>,
    /// Goals that failed, with the reason
    pub failed: Vec<(ResourceId, String)>,
}

/// Registry of compiled goals.
pub struct GoalLibrary {
    goals: Arc<RwLock<HashMap<ResourceId, Arc<CompiledGoal>>>>,
}

impl GoalLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self {
            goals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Compile every definition and replace the library contents.
    ///
    /// A goal that fails to compile is logged and left out; the others load.
    pub async fn reload(
        &self,
        definitions: impl IntoIterator<Item = (ResourceId, GoalDefinition)>,
        registry: &dyn ItemRegistry,
    ) -> LoadReport {
        let compiler = GoalCompiler::new(registry);
        let mut report = LoadReport::default();
        let mut compiled = HashMap::new();

        for (id, definition) in definitions {
            match compiler.compile(id.clone(), &definition) {
                Ok(goal) => {
                    report.loaded.push(id.clone());
                    compiled.insert(id, Arc::new(goal));
                }
                Err(e) => {
                    error!(goal = %id, error = %e, "Failed to compile goal");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        let mut goals = self.goals.write().await;
        *goals = compiled;

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Goal library reloaded"
        );
        report
    }

    /// Read `*.json` definitions from a directory, naming each goal
    /// `<namespace>:<file stem>`, and reload from them.
    pub async fn load_dir(
        &self,
        dir: &Path,
        namespace: &str,
        registry: &dyn ItemRegistry,
    ) -> Result<LoadReport> {
        let mut definitions = Vec::new();
        let mut unreadable = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| GoalError::InvalidEntry(format!("{}: {e}", dir.display())))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = ResourceId::new(namespace, stem);
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(text) => serde_json::from_str::<serde_json::Value>(&text)
                    .map_err(GoalError::from)
                    .and_then(GoalDefinition::from_json),
                Err(e) => Err(GoalError::InvalidEntry(e.to_string())),
            };
            match parsed {
                Ok(definition) => definitions.push((id, definition)),
                Err(e) => {
                    error!(goal = %id, error = %e, "Failed to read goal definition");
                    unreadable.push((id, e.to_string()));
                }
            }
        }

        let mut report = self.reload(definitions, registry).await;
        report.failed.extend(unreadable);
        Ok(report)
    }

    /// Insert a single compiled goal.
    pub async fn insert(&self, goal: CompiledGoal) {
        let mut goals = self.goals.write().await;
        goals.insert(goal.id.clone(), Arc::new(goal));
    }

    /// Look up a goal.
    pub async fn get(&self, id: &ResourceId) -> Option<Arc<CompiledGoal>> {
        let goals = self.goals.read().await;
        goals.get(id).cloned()
    }

    /// All goal identifiers, sorted.
    pub async fn ids(&self) -> Vec<ResourceId> {
        let goals = self.goals.read().await;
        let mut ids: Vec<_> = goals.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of goals.
    pub async fn len(&self) -> usize {
        self.goals.read().await.len()
    }

    /// Whether the library is empty.
    pub async fn is_empty(&self) -> bool {
        self.goals.read().await.is_empty()
    }
}

impl Default for GoalLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;
    use serde_json::json;

    fn definition(items: serde_json::Value) -> GoalDefinition {
        GoalDefinition::from_json(json!({ "items": items })).unwrap()
    }

    #[tokio::test]
    async fn test_reload_skips_broken_goals() {
        let registry = StaticRegistry::new().with_items(["stone", "dirt"]);
        let library = GoalLibrary::new();

        let report = library
            .reload(
                vec![
                    (ResourceId::new("speedabc", "good"), definition(json!(["stone", "dirt"]))),
                    (ResourceId::new("speedabc", "bad"), definition(json!(["stone", "bedrock"]))),
                ],
                &registry,
            )
            .await;

        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(library.get(&ResourceId::new("speedabc", "good")).await.is_some());
        assert!(library.get(&ResourceId::new("speedabc", "bad")).await.is_none());
    }

    #[tokio::test]
    async fn test_reload_replaces_contents() {
        let registry = StaticRegistry::new().with_items(["stone"]);
        let library = GoalLibrary::new();

        library
            .reload(vec![(ResourceId::new("speedabc", "a"), definition(json!(["stone"])))], &registry)
            .await;
        library
            .reload(vec![(ResourceId::new("speedabc", "b"), definition(json!(["stone"])))], &registry)
            .await;

        assert_eq!(library.ids().await, vec![ResourceId::new("speedabc", "b")]);
    }

    #[tokio::test]
    async fn test_load_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("alpha.json"), r#"{"items": ["stone"]}"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "not json").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let registry = StaticRegistry::new().with_items(["stone"]);
        let library = GoalLibrary::new();
        let report = library.load_dir(dir.path(), "speedabc", &registry).await.unwrap();

        assert_eq!(report.loaded, vec![ResourceId::new("speedabc", "alpha")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(library.len().await, 1);
    }
}
