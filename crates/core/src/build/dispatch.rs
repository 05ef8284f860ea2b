//! Sequential dispatch of a build phase's commands
//!
//! The dispatcher picks an executor for the phase's strategy, walks the
//! command list in order and records one [`CommandTimer`] per real command.
//! `cd <dir>` entries only move the working directory. The first failure
//! stops the phase; the timers recorded so far are always returned.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::container::{
    ContainerCreate, ContainerExecutor, ContainerIdentity, ContainerRuntime, DockerCli,
    prepare_container,
};
use super::executor::{CommandExecutor, CommandRequest, HostExecutor, SandboxExecutor};
use super::strategy::ExecutionStrategy;
use super::timer::{CommandTimer, RunningTimer};
use super::BuildConfiguration;
use crate::environment::Environment;
use crate::output::OutputDuplicator;
use crate::Error;

/// Lifecycle of a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// No phase dispatched yet
    NotStarted,
    /// Commands are running
    Running,
    /// Every command succeeded
    Succeeded,
    /// A command or the container setup failed
    Failed,
}

/// Result of dispatching one phase
#[derive(Debug)]
pub struct DispatchOutcome {
    /// One timer per command that was started, in order
    pub timers: Vec<CommandTimer>,
    /// First failure, if any
    pub error: Option<Error>,
}

impl DispatchOutcome {
    fn succeeded(timers: Vec<CommandTimer>) -> Self {
        Self {
            timers,
            error: None,
        }
    }

    fn failed(timers: Vec<CommandTimer>, error: Error) -> Self {
        Self {
            timers,
            error: Some(error),
        }
    }

    /// Whether every command succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Terminal state this outcome represents
    #[must_use]
    pub fn state(&self) -> DispatchState {
        if self.is_success() {
            DispatchState::Succeeded
        } else {
            DispatchState::Failed
        }
    }
}

/// Runs build phases with the executor their strategy calls for
pub struct Dispatcher {
    host: Arc<dyn CommandExecutor>,
    sandbox: Arc<dyn CommandExecutor>,
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancellationToken,
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    /// Dispatcher using `sh`, `bwrap` and `docker`, stopping when `cancel` fires
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            host: Arc::new(HostExecutor::new()),
            sandbox: Arc::new(SandboxExecutor::default()),
            runtime: Arc::new(DockerCli::default()),
            cancel,
            state: Mutex::new(DispatchState::NotStarted),
        }
    }

    /// Replace the host executor
    #[must_use]
    pub fn with_host_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.host = executor;
        self
    }

    /// Replace the sandbox executor
    #[must_use]
    pub fn with_sandbox_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.sandbox = executor;
        self
    }

    /// Replace the container runtime
    #[must_use]
    pub fn with_container_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> DispatchState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: DispatchState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Run every command of `config.phase` with `env` as the overlay.
    ///
    /// Never returns early with an error: failures are carried in the
    /// outcome alongside the timers recorded before them.
    pub async fn dispatch(
        &self,
        config: &BuildConfiguration,
        env: &Environment,
        output: &OutputDuplicator,
    ) -> DispatchOutcome {
        self.set_state(DispatchState::Running);
        let strategy = config.strategy();
        info!(
            package = %config.package,
            phase = %config.target,
            %strategy,
            commands = config.phase.commands.len(),
            "Dispatching build phase"
        );

        let outcome = match strategy {
            _ if config.phase.is_empty() => DispatchOutcome::succeeded(Vec::new()),
            ExecutionStrategy::Host => self.run_commands(self.host.as_ref(), config, env, output).await,
            ExecutionStrategy::Sandboxed => {
                self.run_commands(self.sandbox.as_ref(), config, env, output).await
            }
            ExecutionStrategy::Containerized => self.run_in_container(config, env, output).await,
        };

        self.set_state(outcome.state());
        outcome
    }

    async fn run_in_container(
        &self,
        config: &BuildConfiguration,
        env: &Environment,
        output: &OutputDuplicator,
    ) -> DispatchOutcome {
        let Some(definition) = config.phase.container.as_ref() else {
            return DispatchOutcome::succeeded(Vec::new());
        };
        let identity = ContainerIdentity::new(&config.package, definition);
        let request = ContainerCreate {
            identity: &identity,
            definition,
            package_dir: &config.target_dir,
        };

        let handle = match prepare_container(self.runtime.as_ref(), &request).await {
            Ok(handle) => handle,
            Err(e) => return DispatchOutcome::failed(Vec::new(), e),
        };

        let executor = ContainerExecutor::new(self.runtime.clone(), handle);
        let outcome = self.run_commands(&executor, config, env, output).await;

        if let Err(e) = self.runtime.remove(executor.handle()).await {
            warn!(container = %executor.handle().id, error = %e, "Failed to remove build container");
        }
        outcome
    }

    async fn run_commands(
        &self,
        executor: &dyn CommandExecutor,
        config: &BuildConfiguration,
        env: &Environment,
        output: &OutputDuplicator,
    ) -> DispatchOutcome {
        let mut timers = Vec::with_capacity(config.phase.commands.len());
        let mut dir = config.workdir().to_path_buf();
        let mut root_applied = false;

        for raw in &config.phase.commands {
            if let Some(target) = change_directory(raw) {
                dir = dir.join(target);
                debug!(dir = %dir.display(), "Changed build directory");
                continue;
            }

            if !root_applied {
                root_applied = true;
                if let Some(root) = config.phase.root.as_deref().filter(|r| !r.trim().is_empty()) {
                    dir = dir.join(root.trim());
                }
            }

            if self.cancel.is_cancelled() {
                return DispatchOutcome::failed(
                    timers,
                    Error::Cancelled {
                        command: raw.clone(),
                    },
                );
            }

            let command = with_prefix(config.exec_prefix(), raw);
            output.line(format!("Running: {command}"));

            let running = RunningTimer::start(&command);
            let result = executor
                .execute(&CommandRequest {
                    command: &command,
                    working_dir: &dir,
                    env,
                    output,
                    timeout: config.flags.timeout,
                    cancel: &self.cancel,
                })
                .await;
            let timer = running.finish();
            info!(
                command = %command,
                executor = executor.name(),
                elapsed_ms = timer.elapsed().as_millis(),
                success = result.is_ok(),
                "Command finished"
            );
            timers.push(timer);

            if let Err(e) = result {
                return DispatchOutcome::failed(timers, e);
            }
        }

        DispatchOutcome::succeeded(timers)
    }
}

/// Target of a `cd <dir>` pseudo-command
fn change_directory(command: &str) -> Option<&Path> {
    command
        .trim()
        .strip_prefix("cd ")
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(Path::new)
}

fn with_prefix(prefix: Option<&str>, command: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix} {command}"),
        None => command.to_string(),
    }
}
