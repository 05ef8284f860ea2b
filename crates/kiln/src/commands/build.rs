//! `kiln build`

use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kiln_core::build::{
    BuildConfiguration, BuildFlags, BuildSummary, DispatchOutcome, Dispatcher, ExecutionStrategy,
    SandboxExecutor,
};
use kiln_core::buildlog::LogPublisher;
use kiln_core::config::Settings;
use kiln_core::environment::Environment;
use kiln_core::manifest::{Package, parse_build_arg};
use kiln_core::output::OutputDuplicator;
use kiln_core::paths;
use kiln_core::provision::Provisioner;
use kiln_core::tools::{HostTarget, ToolRegistry};

use crate::cli::CliError;

/// What to build
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Target name or `@package:target`
    pub target: Option<String>,
    /// Invocation flags
    pub flags: BuildFlags,
}

/// How a build invocation ended
#[derive(Debug)]
pub enum BuildResult {
    /// `--deps-only`: tools were provisioned, nothing ran
    DependenciesOnly,
    /// Commands were dispatched
    Dispatched {
        /// Timers and the first failure
        outcome: DispatchOutcome,
        /// Where the uploaded log can be viewed
        log_url: Option<String>,
    },
}

impl BuildResult {
    /// Whether the invocation succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::DependenciesOnly => true,
            Self::Dispatched { outcome, .. } => outcome.is_success(),
        }
    }
}

/// Run a build from `cwd`.
///
/// Build output and the summary go through `output`. A failing command is
/// not an `Err`: it is reported in the returned outcome.
///
/// # Errors
///
/// Returns an error when the package, target or settings are invalid, or
/// when the toolchain cannot be provisioned.
pub async fn execute_build(
    request: &BuildRequest,
    cwd: &Path,
    registry: &ToolRegistry,
    settings: &Settings,
    output: &OutputDuplicator,
    cancel: CancellationToken,
) -> Result<BuildResult, CliError> {
    let started = Local::now();

    let (package_name, target) = match request.target.as_deref() {
        Some(arg) => {
            let (package, target) = parse_build_arg(arg)?;
            (package, Some(target))
        }
        None => (None, None),
    };
    let package = Package::locate(cwd, package_name.as_deref())?;
    let (target, phase) = package.instructions.resolve_target(target.as_deref())?;
    let config = BuildConfiguration::new(&package, target, phase.clone(), request.flags.clone());
    let strategy = config.strategy();
    info!(package = %package.name, target = %config.target, %strategy, "Building");

    let package_cache = paths::package_cache_dir(&package.name)?;
    if config.flags.clean_build && package_cache.exists() {
        info!(dir = %package_cache.display(), "Removing package cache");
        tokio::fs::remove_dir_all(&package_cache)
            .await
            .map_err(|e| kiln_core::Error::io(e, &package_cache, "remove package cache"))?;
    }
    tokio::fs::create_dir_all(&package_cache)
        .await
        .map_err(|e| kiln_core::Error::io(e, &package_cache, "create package cache"))?;

    let mut env = Environment::new();
    let requirements = package.instructions.tool_requirements(&config.phase)?;
    if strategy == ExecutionStrategy::Containerized {
        if !requirements.is_empty() {
            warn!(
                tools = requirements.len(),
                "Skipping tool provisioning; tools are not visible inside the build container"
            );
        }
    } else {
        let target = Arc::new(HostTarget::new(paths::downloads_dir()?)?);
        Provisioner::new(registry, paths::tools_dir()?, &package_cache, target)
            .provision(&requirements, &mut env)
            .await?;
    }

    if config.flags.dependencies_only {
        info!("Dependencies installed; not building (--deps-only)");
        return Ok(BuildResult::DependenciesOnly);
    }

    env.apply_assignments(&config.phase.environment, config.workdir())?;

    let dispatcher = Dispatcher::new(cancel).with_sandbox_executor(Arc::new(
        SandboxExecutor::default().with_writable(&package_cache),
    ));
    let outcome = dispatcher.dispatch(&config, &env, output).await;

    BuildSummary {
        target: &config.target,
        timers: &outcome.timers,
        started,
        finished: Local::now(),
        error: outcome.error.as_ref(),
    }
    .write_to(output);

    let log_url = match output.captured() {
        Some(captured) if settings.upload_build_logs => {
            upload(settings, captured.to_string_lossy()).await
        }
        _ => None,
    };
    if let Some(url) = &log_url {
        output.line(format!("View your build log here: {url}"));
    }

    Ok(BuildResult::Dispatched { outcome, log_url })
}

async fn upload(settings: &Settings, contents: String) -> Option<String> {
    match LogPublisher::new(settings.clone()) {
        Ok(publisher) => publisher.publish(contents).await,
        Err(e) => {
            warn!(error = %e, "Build log upload unavailable");
            None
        }
    }
}
