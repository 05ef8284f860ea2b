//! Toolchain provisioning for a build phase
//!
//! Installs every required tool and applies its setup to the invocation's
//! environment overlay, in declaration order.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::environment::Environment;
use crate::manifest::ToolRequirement;
use crate::tools::{InstallTarget, ToolRegistry, ToolSpec};
use crate::{Error, Result};

/// A tool that was installed and set up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledTool {
    /// Tool name
    pub name: String,
    /// Installed version
    pub version: String,
    /// Install directory in the shared cache
    pub dir: PathBuf,
}

/// Installs and configures the tools of one build phase
pub struct Provisioner<'a> {
    registry: &'a ToolRegistry,
    shared_cache_dir: PathBuf,
    package_cache_dir: PathBuf,
    target: Arc<dyn InstallTarget>,
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner over `registry`.
    #[must_use]
    pub fn new(
        registry: &'a ToolRegistry,
        shared_cache_dir: impl Into<PathBuf>,
        package_cache_dir: impl Into<PathBuf>,
        target: Arc<dyn InstallTarget>,
    ) -> Self {
        Self {
            registry,
            shared_cache_dir: shared_cache_dir.into(),
            package_cache_dir: package_cache_dir.into(),
            target,
        }
    }

    /// Install each requirement, then run its setup against `env`.
    ///
    /// Stops at the first failure; tools provisioned before it stay installed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTool`] for unregistered names and
    /// [`Error::Provision`] wrapping install or setup failures.
    pub async fn provision(
        &self,
        requirements: &[ToolRequirement],
        env: &mut Environment,
    ) -> Result<Vec<InstalledTool>> {
        let mut installed = Vec::with_capacity(requirements.len());

        for req in requirements {
            let spec = ToolSpec::new(
                req.version.clone(),
                self.shared_cache_dir.clone(),
                self.package_cache_dir.clone(),
                self.target.clone(),
            );
            let provider = self.registry.create(&req.name, spec)?;

            let dir = provider
                .install()
                .await
                .map_err(|e| Error::provision(&req.name, &req.version, e))?;
            provider
                .setup(&dir, env)
                .map_err(|e| Error::provision(&req.name, &req.version, e))?;

            info!(tool = %req.name, version = %req.version, dir = %dir.display(), "Tool ready");
            installed.push(InstalledTool {
                name: req.name.clone(),
                version: req.version.clone(),
                dir,
            });
        }

        Ok(installed)
    }
}
