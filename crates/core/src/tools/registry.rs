//! Tool provider registry.
//!
//! Maps tool names from manifests (`gradle`, `flutter`, ...) to provider
//! constructors. Provider crates expose a constructor and the CLI registers
//! them at startup.

use std::collections::HashMap;

use super::provider::{ToolProvider, ToolSpec};
use crate::{Error, Result};

/// Builds a provider for one version of a tool.
pub type ProviderConstructor = fn(ToolSpec) -> Box<dyn ToolProvider>;

/// Registry of tool provider constructors.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    /// Constructors indexed by tool name.
    constructors: HashMap<&'static str, ProviderConstructor>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`.
    ///
    /// If a constructor with the same name already exists, it will be replaced.
    pub fn register(&mut self, name: &'static str, constructor: ProviderConstructor) {
        self.constructors.insert(name, constructor);
    }

    /// Build the provider for `name` from `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTool`] listing the registered names.
    pub fn create(&self, name: &str, spec: ToolSpec) -> Result<Box<dyn ToolProvider>> {
        self.constructors
            .get(name)
            .map(|constructor| constructor(spec))
            .ok_or_else(|| Error::UnknownTool {
                name: name.to_string(),
                available: Some(format!("Known tools: {}", self.names().join(", "))),
            })
    }

    /// Check if a tool is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Get the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.constructors.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::tools::provider::Platform;
    use crate::tools::testing::RecordingTarget;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;

    struct StubProvider {
        name: &'static str,
        spec: ToolSpec,
    }

    #[async_trait]
    impl ToolProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        fn download_url(&self, _platform: &Platform) -> Result<String> {
            Ok(format!("https://example.com/{}-{}.zip", self.name, self.version()))
        }

        fn setup(&self, _installed: &Path, _env: &mut Environment) -> Result<()> {
            Ok(())
        }
    }

    fn ant(spec: ToolSpec) -> Box<dyn ToolProvider> {
        Box::new(StubProvider { name: "ant", spec })
    }

    fn sbt(spec: ToolSpec) -> Box<dyn ToolProvider> {
        Box::new(StubProvider { name: "sbt", spec })
    }

    fn spec(version: &str) -> ToolSpec {
        ToolSpec::new(version, "/cache/tools", "/cache/packages/app", Arc::new(RecordingTarget::default()))
    }

    #[test]
    fn test_create_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register("ant", ant);

        let provider = registry.create("ant", spec("1.10.14")).unwrap();
        assert_eq!(provider.name(), "ant");
        assert_eq!(provider.version(), "1.10.14");
        assert_eq!(provider.major_version(), "1");
        assert_eq!(
            provider.install_dir(),
            Path::new("/cache/tools/ant/ant-1.10.14")
        );
    }

    #[test]
    fn test_unknown_tool_lists_names() {
        let mut registry = ToolRegistry::new();
        registry.register("sbt", sbt);
        registry.register("ant", ant);

        match registry.create("bazel", spec("7")) {
            Err(Error::UnknownTool { name, available }) => {
                assert_eq!(name, "bazel");
                assert_eq!(available.as_deref(), Some("Known tools: ant, sbt"));
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("bazel should not resolve"),
        }
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register("ant", ant);
        registry.register("ant", sbt);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("ant"));
        assert_eq!(registry.create("ant", spec("1")).unwrap().name(), "sbt");
    }
}
