use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use tracing_subscriber::EnvFilter;

use theme_orchestrator::config::{Cli, Commands, Config};
use theme_orchestrator::decision::Resolution;
use theme_orchestrator::error::OrchestratorError;
use theme_orchestrator::executor::{ExecutionReport, ProcessRunner, TaskOutcome};
use theme_orchestrator::orchestrator::{BuildRun, Orchestrator};
use theme_orchestrator::signal::ChangeContext;

/// Missing theme or invalid configuration (EX_USAGE)
const EXIT_USAGE: u8 = 64;
/// Any other fatal error
const EXIT_FATAL: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let usage = e
                .downcast_ref::<OrchestratorError>()
                .is_some_and(OrchestratorError::is_usage_error);
            ExitCode::from(if usage { EXIT_USAGE } else { EXIT_FATAL })
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.options.verbose);
    let config = Config::from_cli(cli.options)?;

    // Setup Ctrl+C handler; the runner kills the running command group when it fires
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let runner = ProcessRunner::new(config.timeout, Arc::clone(&shutdown));
    let orchestrator = Orchestrator::new(&config, &runner, &shutdown);
    let start = Instant::now();

    let report = match &cli.command {
        Commands::SetupThemes => orchestrator.setup_themes()?,
        Commands::BuildAllThemes => {
            let ctx = ChangeContext::from_env();
            let progress = if config.verbose {
                ProgressBar::new(0)
            } else {
                ProgressBar::hidden()
            };
            let run = orchestrator
                .build_all_themes_with(&ctx, &orchestrator.mirror(), &progress)
                .with_context(|| {
                    format!("Failed to build themes in {}", config.themes_root.display())
                })?;
            print_build_summary(&run);
            run.report
        }
        Commands::BuildTheme { name } => orchestrator.build_theme(name)?,
        Commands::TestThemes => orchestrator
            .lint_all_themes()
            .with_context(|| format!("Failed to lint themes in {}", config.themes_root.display()))?,
        Commands::TestTheme { name } => orchestrator.lint_theme(name)?,
    };

    if config.verbose {
        eprintln!(
            "Ran {} command(s) in {:.2}s",
            report
                .results
                .iter()
                .filter(|r| r.outcome != TaskOutcome::Skipped)
                .count(),
            start.elapsed().as_secs_f64()
        );
    }

    Ok(exit_code(&report))
}

/// Per-theme breakdown of a build-all run
fn print_build_summary(run: &BuildRun) {
    for resolved in &run.resolved {
        let status = match &resolved.resolution {
            Resolution::Restored(stats) => format!("restored {} files", stats.files),
            Resolution::Build(reason) => {
                let result = run
                    .report
                    .results
                    .iter()
                    .find(|r| r.task.label == resolved.theme.name);
                match result.map(|r| (r.outcome, r.duration)) {
                    Some((TaskOutcome::Succeeded, took)) => {
                        format!("built ({}) in {:.2}s", reason.as_str(), took.as_secs_f64())
                    }
                    Some((TaskOutcome::Failed { code }, _)) => format!("FAILED: exit code {code}"),
                    Some((TaskOutcome::Skipped, _)) | None => "skipped".to_string(),
                }
            }
        };
        println!("  {}: {}", resolved.theme.name, status);
    }
}

fn exit_code(report: &ExecutionReport) -> ExitCode {
    if let Some(failed) = report.failed_task() {
        eprintln!("{} failed: {}", failed.task.label, failed.task);
    }
    if report.cancelled {
        eprintln!("\nRun cancelled");
        return ExitCode::from(EXIT_INTERRUPTED);
    }
    match report.exit_code {
        0 => ExitCode::SUCCESS,
        code => ExitCode::from(u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)),
    }
}
