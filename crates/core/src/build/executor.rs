//! Command executors for host and sandboxed builds
//!
//! Every executor runs one shell command at a time. Child stdout/stderr are
//! piped into [`OutputDuplicator::drain`] tasks, and the executor awaits
//! those tasks after the child exits so no output is lost or reordered
//! behind the next command. A background process that inherited the pipes
//! gets a short grace period before its output is detached.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::environment::Environment;
use crate::output::OutputDuplicator;
use crate::{Error, Result};

/// Grace period between SIGTERM and SIGKILL for interrupted commands
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// How long output may keep flowing after the command itself has exited
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Default isolation program for sandboxed builds
pub const DEFAULT_SANDBOX_PROGRAM: &str = "bwrap";

/// One command to run, with everything the executor needs
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest<'a> {
    /// Shell command text
    pub command: &'a str,
    /// Directory to run in
    pub working_dir: &'a Path,
    /// Overlay applied on top of the inherited environment
    pub env: &'a Environment,
    /// Where stdout/stderr go
    pub output: &'a OutputDuplicator,
    /// Kill the command after this long
    pub timeout: Option<Duration>,
    /// Kill the command when cancelled
    pub cancel: &'a CancellationToken,
}

/// Trait for command executors
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Executor name for logs
    fn name(&self) -> &'static str;

    /// Run `request` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] on spawn failure or non-zero exit,
    /// [`Error::Timeout`] or [`Error::Cancelled`] when interrupted.
    async fn execute(&self, request: &CommandRequest<'_>) -> Result<()>;
}

/// Runs commands on the host with `sh -c`
#[derive(Debug, Clone, Copy, Default)]
pub struct HostExecutor;

impl HostExecutor {
    /// Create a host executor
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for HostExecutor {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn execute(&self, request: &CommandRequest<'_>) -> Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(request.command)
            .current_dir(request.working_dir)
            .envs(request.env.iter());
        run_process(cmd, request).await
    }
}

/// Runs commands on the host inside an isolation wrapper.
///
/// The default wrapper is bubblewrap: the root filesystem is mounted
/// read-only, the working directory and any extra writable paths are
/// bind-mounted read-write, and the command gets its own PID namespace.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    program: String,
    writable: Vec<PathBuf>,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SANDBOX_PROGRAM)
    }
}

impl SandboxExecutor {
    /// Sandbox using `program` as the isolation wrapper
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            writable: Vec::new(),
        }
    }

    /// Also allow writes to `path` (e.g. a package cache)
    #[must_use]
    pub fn with_writable(mut self, path: impl Into<PathBuf>) -> Self {
        self.writable.push(path.into());
        self
    }

    /// Wrapper arguments preceding `sh -c <command>`
    #[must_use]
    pub fn wrapper_args(&self, working_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["--ro-bind", "/", "/", "--dev", "/dev", "--proc", "/proc", "--tmpfs", "/tmp"]
            .into_iter()
            .map(String::from)
            .collect();

        for path in std::iter::once(working_dir).chain(self.writable.iter().map(PathBuf::as_path)) {
            let path = path.to_string_lossy().into_owned();
            args.extend(["--bind".to_string(), path.clone(), path]);
        }

        args.extend([
            "--unshare-pid".to_string(),
            "--die-with-parent".to_string(),
            "--chdir".to_string(),
            working_dir.to_string_lossy().into_owned(),
        ]);
        args
    }
}

#[async_trait]
impl CommandExecutor for SandboxExecutor {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn execute(&self, request: &CommandRequest<'_>) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.wrapper_args(request.working_dir))
            .arg("sh")
            .arg("-c")
            .arg(request.command)
            .current_dir(request.working_dir)
            .envs(request.env.iter());
        run_process(cmd, request).await
    }
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

/// Spawn `cmd` with piped output, wait for it under the request's timeout
/// and cancellation, then wait for its output to drain.
///
/// # Errors
///
/// See [`CommandExecutor::execute`].
pub async fn run_process(mut cmd: Command, request: &CommandRequest<'_>) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| {
        Error::execution(request.command, format!("failed to spawn: {e}"), None)
    })?;
    debug!(command = request.command, pid = ?child.id(), "Spawned command");

    let drains: Vec<_> = [
        child.stdout.take().map(|out| request.output.drain(out)),
        child.stderr.take().map(|err| request.output.drain(err)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let waited = tokio::select! {
        status = child.wait() => Waited::Exited(status),
        () = request.cancel.cancelled() => Waited::Cancelled,
        () = sleep_for(request.timeout) => Waited::TimedOut(request.timeout.unwrap_or_default()),
    };

    if !matches!(waited, Waited::Exited(_)) {
        terminate(&mut child).await;
    }

    finish_drains(drains, request.command).await;

    match waited {
        Waited::Exited(Ok(status)) if status.success() => Ok(()),
        Waited::Exited(Ok(status)) => Err(Error::execution(
            request.command,
            format!("exited with {status}"),
            status.code(),
        )),
        Waited::Exited(Err(e)) => Err(Error::execution(
            request.command,
            format!("failed to wait: {e}"),
            None,
        )),
        Waited::TimedOut(limit) => Err(Error::Timeout {
            command: request.command.to_string(),
            seconds: limit.as_secs(),
        }),
        Waited::Cancelled => Err(Error::Cancelled {
            command: request.command.to_string(),
        }),
    }
}

/// Wait for the output drains, detaching any still held open by a process
/// the command left running in the background.
async fn finish_drains(drains: Vec<JoinHandle<io::Result<u64>>>, command: &str) {
    let deadline = Instant::now() + DRAIN_GRACE;
    for mut drain in drains {
        match tokio::time::timeout_at(deadline, &mut drain).await {
            Ok(Ok(Ok(_))) => {}
            Ok(Ok(Err(e))) => warn!(command, error = %e, "Reading command output failed"),
            Ok(Err(e)) => warn!(command, error = %e, "Output drain task failed"),
            Err(_) => {
                debug!(command, "Output still open after command exited; detaching");
                drain.abort();
            }
        }
    }
}

async fn sleep_for(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Stop the child and everything it spawned.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGTERM);
        let exited = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok();
        // Stragglers in the group would otherwise keep the output pipes open
        signal_group(pid, libc::SIGKILL);
        if exited {
            return;
        }
    }

    if let Err(e) = child.kill().await {
        debug!(error = %e, "Child already gone");
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: the child was spawned with process_group(0), so its pid is
    // also its process group id; a negative pid addresses the whole group.
    #[expect(unsafe_code, reason = "Required for POSIX process-group signalling")]
    unsafe {
        libc::kill(-pgid, signal);
    }
}
