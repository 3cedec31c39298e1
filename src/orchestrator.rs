//! Theme orchestration entry points.
//!
//! Each command resolves all of its work into a task queue first and only
//! then drains it through the executor:
//! - `setup-themes`: one install task per theme
//! - `build-all-themes`: discovery, build/restore decisions, restores, builds
//! - `build-theme`: one unconditional build task
//! - `test-themes` / `test-theme`: one lint task per theme

use std::sync::atomic::AtomicBool;

use indicatif::ProgressBar;
use tracing::info;

use crate::config::Config;
use crate::decision::{build_queue, plan, resolve, BuildReason, Resolution, ResolvedTheme};
use crate::error::OrchestratorError;
use crate::executor::{execute, CommandLine, CommandTask, ExecutionReport, TaskRunner};
use crate::mirror::{ArtifactMirror, ArtifactSource};
use crate::scanner::{discover_themes, find_theme};
use crate::signal::ChangeContext;
use crate::theme::{IgnoreSet, ThemeProject};

/// Everything a `build-all-themes` run decided and did
#[derive(Debug, Clone)]
pub struct BuildRun {
    pub resolved: Vec<ResolvedTheme>,
    pub report: ExecutionReport,
}

/// Shared collaborators of every command
pub struct Orchestrator<'a, R: TaskRunner + ?Sized> {
    config: &'a Config,
    runner: &'a R,
    shutdown: &'a AtomicBool,
}

impl<'a, R: TaskRunner + ?Sized> Orchestrator<'a, R> {
    pub fn new(config: &'a Config, runner: &'a R, shutdown: &'a AtomicBool) -> Self {
        Self {
            config,
            runner,
            shutdown,
        }
    }

    /// Mirror configured for this docroot
    pub fn mirror(&self) -> ArtifactMirror {
        ArtifactMirror::new(
            &self.config.docroot,
            &self.config.mirror_root,
            self.config.output_dirs.clone(),
        )
    }

    /// Install dependencies for every theme the lint pass would see
    pub fn setup_themes(&self) -> Result<ExecutionReport, OrchestratorError> {
        let themes = self.discover(&self.config.lint_ignore)?;
        let tasks = per_theme(&themes, &self.config.setup_command);
        Ok(self.drain(tasks))
    }

    /// Build or restore every theme according to the CI change signals
    pub fn build_all_themes(&self, ctx: &ChangeContext) -> Result<BuildRun, OrchestratorError> {
        self.build_all_themes_with(ctx, &self.mirror(), &ProgressBar::hidden())
    }

    /// [`Self::build_all_themes`] with an explicit artifact source
    pub fn build_all_themes_with<S: ArtifactSource + ?Sized>(
        &self,
        ctx: &ChangeContext,
        source: &S,
        progress: &ProgressBar,
    ) -> Result<BuildRun, OrchestratorError> {
        let themes = self.discover(&self.config.build_ignore)?;

        if ctx.is_push_with_changes() {
            info!(
                "CI push detected; unchanged themes restore from {}",
                self.config.mirror_root.display()
            );
        } else {
            info!("Not a CI push with changes; building all themes");
        }

        let planned = plan(ctx, self.config.matcher, themes);
        let resolved = resolve(planned, source, progress);
        for r in &resolved {
            info!("{}: {}", r.theme.name, r.resolution);
        }

        let tasks = build_queue(&resolved, &self.config.build_command);
        let report = self.drain(tasks);
        Ok(BuildRun { resolved, report })
    }

    /// Build one named theme, bypassing the decision engine
    pub fn build_theme(&self, name: &str) -> Result<ExecutionReport, OrchestratorError> {
        let theme = find_theme(&self.config.themes_root, name)?;
        info!("{}: {}", theme.name, Resolution::Build(BuildReason::Explicit));
        let tasks = per_theme(&[theme], &self.config.build_command);
        Ok(self.drain(tasks))
    }

    /// Lint every theme, stopping at the first failure
    pub fn lint_all_themes(&self) -> Result<ExecutionReport, OrchestratorError> {
        let themes = self.discover(&self.config.lint_ignore)?;
        let tasks = per_theme(&themes, &self.config.lint_command);
        Ok(self.drain(tasks))
    }

    /// Lint one named theme
    pub fn lint_theme(&self, name: &str) -> Result<ExecutionReport, OrchestratorError> {
        let theme = find_theme(&self.config.themes_root, name)?;
        let tasks = per_theme(&[theme], &self.config.lint_command);
        Ok(self.drain(tasks))
    }

    fn discover(&self, ignored: &IgnoreSet) -> Result<Vec<ThemeProject>, OrchestratorError> {
        let themes = discover_themes(&self.config.themes_root, ignored, &self.config.marker)?;
        info!(
            "Found {} theme(s) in {}",
            themes.len(),
            self.config.themes_root.display()
        );
        Ok(themes)
    }

    fn drain(&self, tasks: Vec<CommandTask>) -> ExecutionReport {
        if tasks.is_empty() {
            info!("Nothing to run");
        }
        execute(tasks, self.runner, self.shutdown)
    }
}

fn per_theme(themes: &[ThemeProject], command: &CommandLine) -> Vec<CommandTask> {
    themes
        .iter()
        .map(|t| CommandTask::new(&t.name, command, &t.path))
        .collect()
}
