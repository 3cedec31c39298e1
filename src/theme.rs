//! Theme project and ignore-set types.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::error::OrchestratorError;

/// Directories skipped when discovering themes to build
pub const BUILD_IGNORED_DIRS: &[&str] = &["example_subtheme", "node_modules", "gulp-tasks"];

/// Directories skipped when discovering themes to lint
pub const LINT_IGNORED_DIRS: &[&str] = &["node_modules"];

/// An independently buildable theme under the themes root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeProject {
    /// Directory basename (e.g., "my_theme")
    pub name: String,
    /// Full path to the theme directory
    pub path: PathBuf,
}

impl ThemeProject {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ThemeProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Directory basenames excluded from discovery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet(BTreeSet<String>);

impl IgnoreSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Ignore policy of the build pass
    pub fn build_default() -> Self {
        Self::new(BUILD_IGNORED_DIRS.iter().copied())
    }

    /// Ignore policy of the lint pass (keeps the example theme)
    pub fn lint_default() -> Self {
        Self::new(LINT_IGNORED_DIRS.iter().copied())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reject names that would escape the themes root
pub fn validate_theme_name(name: &str) -> Result<(), OrchestratorError> {
    if name.trim().is_empty() {
        return Err(OrchestratorError::InvalidInput(
            "theme name must not be empty".to_string(),
        ));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(OrchestratorError::InvalidInput(format!(
            "invalid theme name: {name}"
        )));
    }
    Ok(())
}
