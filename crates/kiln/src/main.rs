//! kiln CLI Application

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use kiln::cli::{self, CliError, EXIT_BUILD_FAILED, EXIT_OK, exit_code_for, render_error};
use kiln::commands::build::{BuildRequest, execute_build};
use kiln::commands::platform::execute_platform;
use kiln::registry::default_registry;
use kiln::shutdown::install_signal_handlers;
use kiln::tracing::{TracingConfig, init_tracing};
use kiln_core::config::Settings;
use kiln_core::output::OutputDuplicator;

fn main() {
    // Tracing may be unusable during a panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.format,
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("Failed to initialize tracing: {e}");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_BUILD_FAILED);
        }
    };

    let exit_code = match rt.block_on(run(cli)) {
        Ok(code) => code,
        Err(err) => {
            render_error(&err);
            exit_code_for(&err)
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: cli::Cli) -> Result<i32, CliError> {
    let flags = cli.command.build_flags();
    match cli.command {
        cli::Commands::Platform => {
            print!("{}", execute_platform()?);
            Ok(EXIT_OK)
        }
        cli::Commands::Build { target, .. } => {
            let cancel = install_signal_handlers();
            let settings = Settings::load()?;
            let cwd = std::env::current_dir()
                .map_err(|e| CliError::config(format!("Cannot read working directory: {e}")))?;
            let request = BuildRequest {
                target,
                flags: flags.unwrap_or_default(),
            };
            let output = OutputDuplicator::console(settings.upload_build_logs);

            let result = execute_build(
                &request,
                &cwd,
                &default_registry(),
                &settings,
                &output,
                cancel,
            )
            .await?;

            Ok(if result.is_success() {
                EXIT_OK
            } else {
                EXIT_BUILD_FAILED
            })
        }
    }
}
