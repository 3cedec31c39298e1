//! CLI configuration and runtime settings for theme orchestration.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::OrchestratorError;
use crate::executor::CommandLine;
use crate::signal::ChangeMatcher;
use crate::theme::{IgnoreSet, BUILD_IGNORED_DIRS, LINT_IGNORED_DIRS};

/// Build, restore and lint front-end themes in CI
#[derive(Parser, Debug)]
#[command(name = "theme-orchestrator")]
#[command(version)]
#[command(about = "Build, restore and lint front-end themes in CI")]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Install theme dependencies
    SetupThemes,
    /// Build every theme, restoring unchanged ones from the mirror on CI pushes
    BuildAllThemes,
    /// Build a single theme unconditionally
    BuildTheme {
        /// Theme directory name
        name: String,
    },
    /// Lint every theme, stopping at the first failure
    TestThemes,
    /// Lint a single theme
    TestTheme {
        /// Theme directory name
        name: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Web root containing the themes tree
    #[arg(long, global = true, env = "THEME_DOCROOT", default_value = "docroot")]
    pub docroot: PathBuf,

    /// Themes directory, relative to the docroot
    #[arg(long, global = true, env = "THEME_DIR", default_value = "themes/custom")]
    pub themes_dir: PathBuf,

    /// Deployment mirror of the docroot [default: <docroot>/../deploy/<docroot name>]
    #[arg(long, global = true, env = "THEME_MIRROR_ROOT")]
    pub mirror_root: Option<PathBuf>,

    /// File marking a directory as a buildable theme
    #[arg(long, global = true, env = "THEME_MARKER", default_value = "gulpfile.js")]
    pub marker: String,

    /// Built output directories restored from the mirror (comma-separated)
    #[arg(
        long = "output-dir",
        global = true,
        env = "THEME_OUTPUT_DIRS",
        value_delimiter = ',',
        default_value = "css"
    )]
    pub output_dirs: Vec<PathBuf>,

    /// Command building one theme
    #[arg(long, global = true, env = "THEME_BUILD_CMD", default_value = "npm run build")]
    pub build_cmd: String,

    /// Command linting one theme
    #[arg(long, global = true, env = "THEME_LINT_CMD", default_value = "npm run lint")]
    pub lint_cmd: String,

    /// Command installing theme dependencies
    #[arg(
        long,
        global = true,
        env = "THEME_SETUP_CMD",
        default_value = "npm install --unsafe-perm=true"
    )]
    pub setup_cmd: String,

    /// Directories skipped by the build pass (comma-separated)
    #[arg(long, global = true, value_delimiter = ',', default_values_t = BUILD_IGNORED_DIRS.iter().map(|s| s.to_string()).collect::<Vec<_>>())]
    pub build_ignore: Vec<String>,

    /// Directories skipped by the lint and setup passes (comma-separated)
    #[arg(long, global = true, value_delimiter = ',', default_values_t = LINT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect::<Vec<_>>())]
    pub lint_ignore: Vec<String>,

    /// How theme names are matched against CHANGED_THEME_FILES (exact, substring)
    #[arg(long, global = true, env = "THEME_MATCH_MODE", default_value = "exact")]
    pub match_mode: ChangeMatcher,

    /// Kill a theme command after this many seconds
    #[arg(long, global = true, env = "THEME_COMMAND_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Runtime configuration parsed from CLI
#[derive(Debug, Clone)]
pub struct Config {
    pub docroot: PathBuf,
    /// Directory scanned for themes
    pub themes_root: PathBuf,
    pub mirror_root: PathBuf,
    pub marker: String,
    pub output_dirs: Vec<PathBuf>,
    pub build_command: CommandLine,
    pub lint_command: CommandLine,
    pub setup_command: CommandLine,
    /// Build-pass ignore policy
    pub build_ignore: IgnoreSet,
    /// Lint-pass ignore policy
    pub lint_ignore: IgnoreSet,
    pub matcher: ChangeMatcher,
    pub timeout: Option<Duration>,
    pub verbose: bool,
}

impl Config {
    /// Create Config from CLI options
    pub fn from_cli(options: GlobalOptions) -> Result<Self, OrchestratorError> {
        let docroot = options
            .docroot
            .canonicalize()
            .unwrap_or(options.docroot);
        let themes_root = docroot.join(&options.themes_dir);
        let mirror_root = options
            .mirror_root
            .unwrap_or_else(|| default_mirror_root(&docroot));

        if options.marker.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "marker file name must not be empty".to_string(),
            ));
        }

        let output_dirs: Vec<PathBuf> = options
            .output_dirs
            .into_iter()
            .filter(|d| !d.as_os_str().is_empty())
            .collect();
        if output_dirs.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "at least one output directory is required".to_string(),
            ));
        }
        if let Some(dir) = output_dirs.iter().find(|d| d.is_absolute()) {
            return Err(OrchestratorError::InvalidInput(format!(
                "output directory must be relative: {}",
                dir.display()
            )));
        }

        Ok(Config {
            docroot,
            themes_root,
            mirror_root,
            marker: options.marker,
            output_dirs,
            build_command: CommandLine::parse(&options.build_cmd)?,
            lint_command: CommandLine::parse(&options.lint_cmd)?,
            setup_command: CommandLine::parse(&options.setup_cmd)?,
            build_ignore: IgnoreSet::new(options.build_ignore),
            lint_ignore: IgnoreSet::new(options.lint_ignore),
            matcher: options.match_mode,
            timeout: options.timeout.filter(|s| *s > 0).map(Duration::from_secs),
            verbose: options.verbose,
        })
    }
}

/// `<docroot>/../deploy/<docroot name>`
pub fn default_mirror_root(docroot: &Path) -> PathBuf {
    let name = docroot
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("docroot"));
    docroot
        .parent()
        .unwrap_or(docroot)
        .join("deploy")
        .join(name)
}
