//! Build-or-restore decisions for the build pass.
//!
//! Works in two phases so decision logic stays free of I/O:
//! - [`plan`] maps every discovered theme to a [`BuildDecision`] using only
//!   the [`ChangeContext`]
//! - [`resolve`] attempts the tentative restores and escalates any failure
//!   to a build
//!
//! [`build_queue`] then turns the resolved plan into the command queue.

use std::fmt;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::executor::{CommandLine, CommandTask};
use crate::mirror::{ArtifactSource, RestoreStats};
use crate::signal::{ChangeContext, ChangeMatcher};
use crate::theme::ThemeProject;

/// Why a theme is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildReason {
    /// Local run, non-push event, or unknown change-set
    NotCiPush,
    /// The push touched this theme
    ThemeChanged,
    /// Restore was attempted and failed
    RestoreFailed,
    /// Requested by name
    Explicit,
}

impl BuildReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildReason::NotCiPush => "not a CI push with changes",
            BuildReason::ThemeChanged => "theme changed",
            BuildReason::RestoreFailed => "restore failed",
            BuildReason::Explicit => "explicit build",
        }
    }
}

/// Phase one outcome for a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildDecision {
    Build(BuildReason),
    /// Tentative: becomes a build if the restore fails
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTheme {
    pub theme: ThemeProject,
    pub decision: BuildDecision,
}

/// Phase two outcome for a theme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Restored(RestoreStats),
    Build(BuildReason),
}

impl Resolution {
    pub fn needs_build(&self) -> bool {
        matches!(self, Resolution::Build(_))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Restored(stats) => write!(f, "restored ({} files)", stats.files),
            Resolution::Build(reason) => write!(f, "build ({})", reason.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTheme {
    pub theme: ThemeProject,
    pub resolution: Resolution,
}

/// Decide whether `theme` must be rebuilt
///
/// Rebuilding is the default. A restore is only proposed for a CI push with
/// a known change-set that does not touch the theme.
pub fn decide(ctx: &ChangeContext, matcher: ChangeMatcher, theme: &ThemeProject) -> BuildDecision {
    if !ctx.is_push_with_changes() {
        return BuildDecision::Build(BuildReason::NotCiPush);
    }

    if matcher.is_changed(&theme.name, &ctx.theme_changed_files) {
        BuildDecision::Build(BuildReason::ThemeChanged)
    } else {
        BuildDecision::Restore
    }
}

/// Decide every theme, keeping discovery order
pub fn plan(
    ctx: &ChangeContext,
    matcher: ChangeMatcher,
    themes: Vec<ThemeProject>,
) -> Vec<PlannedTheme> {
    themes
        .into_iter()
        .map(|theme| {
            let decision = decide(ctx, matcher, &theme);
            PlannedTheme { theme, decision }
        })
        .collect()
}

/// Attempt the tentative restores, escalating failures to builds
pub fn resolve<S: ArtifactSource + ?Sized>(
    planned: Vec<PlannedTheme>,
    source: &S,
    progress: &ProgressBar,
) -> Vec<ResolvedTheme> {
    let restores = planned
        .iter()
        .filter(|p| p.decision == BuildDecision::Restore)
        .count();
    progress.set_length(restores as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let resolved = planned
        .into_iter()
        .map(|PlannedTheme { theme, decision }| {
            let resolution = match decision {
                BuildDecision::Build(reason) => Resolution::Build(reason),
                BuildDecision::Restore => {
                    progress.set_message(theme.name.clone());
                    let resolution = restore_or_build(&theme, source);
                    progress.inc(1);
                    resolution
                }
            };
            ResolvedTheme { theme, resolution }
        })
        .collect();

    progress.finish_and_clear();
    resolved
}

fn restore_or_build<S: ArtifactSource + ?Sized>(theme: &ThemeProject, source: &S) -> Resolution {
    info!("Copying unchanged {} theme from mirror", theme.name);
    match source.restore(theme) {
        Ok(stats) => {
            info!(
                "Restored {} ({} files, {} bytes)",
                theme.name, stats.files, stats.bytes
            );
            Resolution::Restored(stats)
        }
        Err(e) => {
            warn!("Unable to restore {}: {e}. Building theme instead", theme.name);
            Resolution::Build(BuildReason::RestoreFailed)
        }
    }
}

/// One build task per theme that still needs building, in plan order
pub fn build_queue(resolved: &[ResolvedTheme], command: &CommandLine) -> Vec<CommandTask> {
    resolved
        .iter()
        .filter(|r| r.resolution.needs_build())
        .map(|r| CommandTask::new(&r.theme.name, command, &r.theme.path))
        .collect()
}
