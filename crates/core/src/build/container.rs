//! Container runtime collaborator for containerized builds
//!
//! A build container is identified by its package and a hash of its
//! definition. Before a containerized phase runs, any container left over
//! with the same identity is removed and a fresh one is created and
//! started; commands are then exec'd into it one at a time.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use super::executor::{CommandExecutor, CommandRequest, run_process};
use crate::error::ContainerStage;
use crate::manifest::ContainerDefinition;
use crate::{Error, Result};

/// Where the package directory is mounted inside the build container
pub const CONTAINER_WORKDIR: &str = "/workspace";

/// Label carrying the package name
pub const PACKAGE_LABEL: &str = "build.kiln.package";

/// Label carrying the definition hash
pub const DEFINITION_LABEL: &str = "build.kiln.definition";

/// Keeps the container alive between exec calls
const KEEP_ALIVE: [&str; 3] = ["tail", "-f", "/dev/null"];

/// Identity of a build container: its package plus a definition hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIdentity {
    /// Package the container builds
    pub package: String,
    /// Short hex digest of the container definition
    pub definition_hash: String,
}

impl ContainerIdentity {
    /// Identity for `definition` used by `package`
    #[must_use]
    pub fn new(package: &str, definition: &ContainerDefinition) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(definition.image.as_bytes());
        for field in [&definition.mounts, &definition.ports, &definition.environment] {
            hasher.update([0]);
            for entry in field {
                hasher.update(entry.as_bytes());
                hasher.update([b'\n']);
            }
        }
        if let Some(command) = &definition.command {
            hasher.update([1]);
            hasher.update(command.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());

        Self {
            package: package.to_string(),
            definition_hash: digest[..12].to_string(),
        }
    }

    /// Container name, restricted to characters runtimes accept
    #[must_use]
    pub fn name(&self) -> String {
        let package: String = self
            .package
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        format!("kiln-{package}-{}", self.definition_hash)
    }

    /// Labels stamped on the container
    #[must_use]
    pub fn labels(&self) -> [(&'static str, &str); 2] {
        [
            (PACKAGE_LABEL, self.package.as_str()),
            (DEFINITION_LABEL, self.definition_hash.as_str()),
        ]
    }
}

/// A created container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Runtime container id
    pub id: String,
}

/// Everything needed to create a build container
#[derive(Debug, Clone, Copy)]
pub struct ContainerCreate<'a> {
    /// Container identity
    pub identity: &'a ContainerIdentity,
    /// Image, mounts, ports, environment and keep-alive command
    pub definition: &'a ContainerDefinition,
    /// Host package directory, mounted at [`CONTAINER_WORKDIR`]
    pub package_dir: &'a Path,
}

/// Trait for container runtimes
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name for logs
    fn name(&self) -> &'static str;

    /// Look up an existing container with `identity`
    async fn find(&self, identity: &ContainerIdentity) -> Result<Option<ContainerHandle>>;

    /// Force-remove a container
    async fn remove(&self, handle: &ContainerHandle) -> Result<()>;

    /// Create (but do not start) a container
    async fn create(&self, request: &ContainerCreate<'_>) -> Result<ContainerHandle>;

    /// Start a created container
    async fn start(&self, handle: &ContainerHandle) -> Result<()>;

    /// Run one command inside a started container.
    ///
    /// # Errors
    ///
    /// Same contract as [`CommandExecutor::execute`].
    async fn exec(&self, handle: &ContainerHandle, request: &CommandRequest<'_>) -> Result<()>;
}

/// Find, replace and start the container for `request`.
///
/// # Errors
///
/// Returns [`Error::ContainerLifecycle`] for the first stage that fails.
pub async fn prepare_container(
    runtime: &dyn ContainerRuntime,
    request: &ContainerCreate<'_>,
) -> Result<ContainerHandle> {
    if let Some(stale) = runtime.find(request.identity).await? {
        info!(container = %stale.id, "Removing previous build container");
        runtime.remove(&stale).await?;
    }

    let handle = runtime.create(request).await?;
    if let Err(e) = runtime.start(&handle).await {
        if let Err(cleanup) = runtime.remove(&handle).await {
            debug!(container = %handle.id, error = %cleanup, "Failed to remove unstarted container");
        }
        return Err(e);
    }

    info!(
        container = %handle.id,
        image = %request.definition.image,
        runtime = runtime.name(),
        "Build container started"
    );
    Ok(handle)
}

/// Drives the `docker` command line (or a compatible one such as `podman`)
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    /// Use `program` as the container CLI
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for `find`
    #[must_use]
    pub fn find_args(identity: &ContainerIdentity) -> Vec<String> {
        let mut args = vec!["ps".to_string(), "-a".to_string(), "-q".to_string()];
        for (key, value) in identity.labels() {
            args.push("--filter".to_string());
            args.push(format!("label={key}={value}"));
        }
        args
    }

    /// Arguments for `create`
    #[must_use]
    pub fn create_args(request: &ContainerCreate<'_>) -> Vec<String> {
        let definition = request.definition;
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            request.identity.name(),
        ];

        for (key, value) in request.identity.labels() {
            args.push("--label".to_string());
            args.push(format!("{key}={value}"));
        }

        args.push("-v".to_string());
        args.push(format!(
            "{}:{CONTAINER_WORKDIR}",
            request.package_dir.display()
        ));
        for mount in &definition.mounts {
            args.push("-v".to_string());
            args.push(resolve_mount(mount, request.package_dir));
        }
        for port in &definition.ports {
            args.push("-p".to_string());
            args.push(port.clone());
        }
        for assignment in &definition.environment {
            args.push("-e".to_string());
            args.push(assignment.clone());
        }

        args.push("-w".to_string());
        args.push(CONTAINER_WORKDIR.to_string());
        args.push(definition.image.trim().to_string());

        match definition.command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => {
                args.extend(["sh".to_string(), "-c".to_string(), command.to_string()]);
            }
            _ => args.extend(KEEP_ALIVE.iter().map(ToString::to_string)),
        }
        args
    }

    /// Arguments for `exec`
    #[must_use]
    pub fn exec_args(handle: &ContainerHandle, request: &CommandRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "-w".to_string(),
            request.working_dir.to_string_lossy().into_owned(),
        ];
        for (key, value) in request.env.iter() {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.extend([
            handle.id.clone(),
            "sh".to_string(),
            "-c".to_string(),
            request.command.to_string(),
        ]);
        args
    }

    async fn run(&self, args: &[String], stage: ContainerStage) -> Result<String> {
        debug!(program = %self.program, ?args, "Running container CLI");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::container(stage, format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::container(
                stage,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Host side of a `host:container` mount, resolved against the package
fn resolve_mount(mount: &str, package_dir: &Path) -> String {
    match mount.split_once(':') {
        Some((host, rest)) if Path::new(host).is_relative() => {
            format!("{}:{rest}", package_dir.join(host).display())
        }
        _ => mount.to_string(),
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn find(&self, identity: &ContainerIdentity) -> Result<Option<ContainerHandle>> {
        let stdout = self.run(&Self::find_args(identity), ContainerStage::Find).await?;
        Ok(stdout.lines().next().map(|id| ContainerHandle {
            id: id.trim().to_string(),
        }))
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<()> {
        let args = ["rm".to_string(), "-f".to_string(), handle.id.clone()];
        self.run(&args, ContainerStage::Remove).await.map(drop)
    }

    async fn create(&self, request: &ContainerCreate<'_>) -> Result<ContainerHandle> {
        let id = self.run(&Self::create_args(request), ContainerStage::Create).await?;
        if id.is_empty() {
            return Err(Error::container(
                ContainerStage::Create,
                "runtime did not report a container id",
            ));
        }
        Ok(ContainerHandle { id })
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<()> {
        let args = ["start".to_string(), handle.id.clone()];
        self.run(&args, ContainerStage::Start).await.map(drop)
    }

    async fn exec(&self, handle: &ContainerHandle, request: &CommandRequest<'_>) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::exec_args(handle, request));
        run_process(cmd, request).await
    }
}

/// Runs commands inside a started build container
pub struct ContainerExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
}

impl ContainerExecutor {
    /// Executor bound to `handle`
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, handle: ContainerHandle) -> Self {
        Self { runtime, handle }
    }

    /// The container commands run in
    #[must_use]
    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }
}

#[async_trait]
impl CommandExecutor for ContainerExecutor {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn execute(&self, request: &CommandRequest<'_>) -> Result<()> {
        self.runtime.exec(&self.handle, request).await
    }
}
