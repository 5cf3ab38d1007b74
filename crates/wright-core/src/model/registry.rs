//! Model registry -- a named collection of available model backends.
//!
//! The CLI resolves the configured backend name (e.g. `backend =
//! "claude-code"`) through the registry before building a pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use super::trait_def::ModelService;

/// A collection of registered [`ModelService`] implementations, keyed by
/// name.
///
/// # Example
///
/// ```ignore
/// let mut registry = ModelRegistry::new();
/// registry.register(CommandModel::new(CommandModelConfig::default()));
/// let model = registry.get("claude-code").unwrap();
/// ```
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn ModelService>>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under the name returned by
    /// [`ModelService::name`]. Returns the backend it replaced, if any.
    pub fn register(
        &mut self,
        model: impl ModelService + 'static,
    ) -> Option<Arc<dyn ModelService>> {
        let name = model.name().to_string();
        self.models.insert(name, Arc::new(model))
    }

    /// Look up a backend by name. The returned handle can be shared across
    /// spawned tasks.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelService>> {
        self.models.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, ModelRequest};
    use async_trait::async_trait;
    use serde_json::Value;

    struct FakeModel {
        model_name: String,
    }

    impl FakeModel {
        fn new(name: &str) -> Self {
            Self {
                model_name: name.to_string(),
            }
        }
    }

    #[async_trait]
    impl ModelService for FakeModel {
        fn name(&self) -> &str {
            &self.model_name
        }

        async fn invoke(&self, _request: &ModelRequest) -> Result<Value, ModelError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn registry_starts_empty() {
        let registry = ModelRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn register_and_get() {
        let mut registry = ModelRegistry::new();
        assert!(registry.register(FakeModel::new("alpha")).is_none());

        let model = registry.get("alpha").expect("registered");
        assert_eq!(model.name(), "alpha");
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = ModelRegistry::new();
        registry.register(FakeModel::new("alpha"));
        let old = registry.register(FakeModel::new("alpha"));
        assert_eq!(old.map(|m| m.name().to_string()).as_deref(), Some("alpha"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        assert!(ModelRegistry::new().get("nonexistent").is_none());
    }

    #[test]
    fn list_is_sorted() {
        let mut registry = ModelRegistry::new();
        registry.register(FakeModel::new("gamma"));
        registry.register(FakeModel::new("alpha"));
        registry.register(FakeModel::new("beta"));
        assert_eq!(registry.list(), vec!["alpha", "beta", "gamma"]);
        assert!(format!("{registry:?}").contains("beta"));
    }
}
