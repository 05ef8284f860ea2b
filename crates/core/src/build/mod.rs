//! Build execution: strategy selection, command executors, dispatch,
//! timing and the summary report.

pub mod container;
pub mod dispatch;
pub mod executor;
pub mod report;
pub mod strategy;
pub mod timer;

pub use container::{
    CONTAINER_WORKDIR, ContainerCreate, ContainerExecutor, ContainerHandle, ContainerIdentity,
    ContainerRuntime, DockerCli,
};
pub use dispatch::{DispatchOutcome, DispatchState, Dispatcher};
pub use executor::{CommandExecutor, CommandRequest, HostExecutor, SandboxExecutor};
pub use report::BuildSummary;
pub use strategy::ExecutionStrategy;
pub use timer::{CommandTimer, RunningTimer};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::manifest::{BuildPhase, Package};

/// Invocation-wide flags from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFlags {
    /// Ignore container definitions and run on the host
    pub host_only: bool,
    /// Wipe the package cache before provisioning
    pub clean_build: bool,
    /// Provision tools, then stop
    pub dependencies_only: bool,
    /// Prepended to every command, separated by a space
    pub exec_prefix: Option<String>,
    /// Per-command time limit
    pub timeout: Option<Duration>,
}

/// Everything the dispatcher needs to run one phase
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// Package name
    pub package: String,
    /// Resolved target name
    pub target: String,
    /// Phase being built
    pub phase: BuildPhase,
    /// Host directory commands start from
    pub target_dir: PathBuf,
    /// Manifest or phase asked for a sandbox
    pub sandboxed: bool,
    /// Invocation flags
    pub flags: BuildFlags,
}

impl BuildConfiguration {
    /// Configuration for `phase` of `package`
    #[must_use]
    pub fn new(
        package: &Package,
        target: impl Into<String>,
        phase: BuildPhase,
        flags: BuildFlags,
    ) -> Self {
        Self {
            package: package.name.clone(),
            target: target.into(),
            sandboxed: package.instructions.sandbox || phase.sandbox,
            phase,
            target_dir: package.path.clone(),
            flags,
        }
    }

    /// How the phase's commands will run
    #[must_use]
    pub fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::select(&self.phase, self.sandboxed, self.flags.host_only)
    }

    /// Directory the first command runs in, as seen by that command.
    ///
    /// Inside a container this is the package mount point.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        match self.strategy() {
            ExecutionStrategy::Containerized => Path::new(CONTAINER_WORKDIR),
            ExecutionStrategy::Host | ExecutionStrategy::Sandboxed => &self.target_dir,
        }
    }

    /// Non-blank exec prefix
    #[must_use]
    pub fn exec_prefix(&self) -> Option<&str> {
        self.flags
            .exec_prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}
