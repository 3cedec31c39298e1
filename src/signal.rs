//! CI change signals.
//!
//! Reads the CI environment once per run into an immutable [`ChangeContext`]
//! and decides whether a given theme was touched by the triggering push.

use std::str::FromStr;

/// Set to `true` when running under GitHub Actions
pub const CI_ACTIVE_VAR: &str = "GITHUB_ACTIONS";
/// Triggering event kind
pub const CI_EVENT_VAR: &str = "GITHUB_EVENT_NAME";
/// Full change-set of the push; empty when unknown
pub const CHANGED_ALL_FILES_VAR: &str = "CHANGED_ALL_FILES";
/// Change-set restricted to the themes tree
pub const CHANGED_THEME_FILES_VAR: &str = "CHANGED_THEME_FILES";

/// The only event that enables the restore optimization
pub const PUSH_EVENT: &str = "push";

/// Snapshot of the CI context taken once per run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeContext {
    pub is_ci: bool,
    pub event_name: String,
    pub all_changed_files: String,
    pub theme_changed_files: String,
}

impl ChangeContext {
    /// Read the context from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the context through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            is_ci: lookup(CI_ACTIVE_VAR).as_deref() == Some("true"),
            event_name: lookup(CI_EVENT_VAR).unwrap_or_default(),
            all_changed_files: lookup(CHANGED_ALL_FILES_VAR).unwrap_or_default(),
            theme_changed_files: lookup(CHANGED_THEME_FILES_VAR).unwrap_or_default(),
        }
    }

    /// A CI push carrying a known, non-empty change-set
    pub fn is_push_with_changes(&self) -> bool {
        self.is_ci && self.event_name == PUSH_EVENT && !self.all_changed_files.trim().is_empty()
    }
}

/// Strategy used to test a theme name against the theme change-set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeMatcher {
    /// Theme name equals a path component of a changed file
    #[default]
    Exact,
    /// Theme name occurs anywhere in the raw change-set text
    Substring,
}

impl ChangeMatcher {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeMatcher::Exact => "exact",
            ChangeMatcher::Substring => "substring",
        }
    }

    /// Whether `theme` appears in the `changed` blob
    pub fn is_changed(&self, theme: &str, changed: &str) -> bool {
        match self {
            ChangeMatcher::Exact => changed_paths(changed).any(|path| {
                path.split(|c: char| c == '/' || c == '\\')
                    .any(|component| component == theme)
            }),
            ChangeMatcher::Substring => changed.contains(theme),
        }
    }
}

impl FromStr for ChangeMatcher {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(ChangeMatcher::Exact),
            "substring" => Ok(ChangeMatcher::Substring),
            other => Err(format!(
                "unknown match mode '{other}' (expected 'exact' or 'substring')"
            )),
        }
    }
}

/// Split a change-set blob into individual paths
///
/// Accepts whitespace, comma or semicolon separated lists as well as
/// quoted entries and JSON-style arrays.
fn changed_paths(blob: &str) -> impl Iterator<Item = &str> {
    blob.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|p| p.trim_matches(&['"', '\'', '[', ']'][..]))
        .filter(|p| !p.is_empty())
}
