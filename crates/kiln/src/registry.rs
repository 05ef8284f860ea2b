//! Tool providers shipped with the kiln binary

use kiln_core::tools::ToolRegistry;
use kiln_tools_flutter::FlutterProvider;
use kiln_tools_gradle::GradleProvider;
use kiln_tools_maven::MavenProvider;
use kiln_tools_rlang::RLangProvider;

/// Registry with every bundled provider
#[must_use]
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register("gradle", GradleProvider::boxed);
    registry.register("maven", MavenProvider::boxed);
    registry.register("flutter", FlutterProvider::boxed);
    registry.register("rlang", RLangProvider::boxed);
    registry
}
