use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::theme::{validate_theme_name, IgnoreSet, ThemeProject};

/// Discover all themes directly under `themes_root`, sorted by name
///
/// A subdirectory qualifies when it is not hidden, is not in `ignored`,
/// and contains the `marker` build descriptor.
#[must_use = "this returns the discovered themes which should be processed"]
pub fn discover_themes(
    themes_root: &Path,
    ignored: &IgnoreSet,
    marker: &str,
) -> Result<Vec<ThemeProject>, OrchestratorError> {
    let entries =
        fs::read_dir(themes_root).map_err(|source| OrchestratorError::DirectoryNotFound {
            path: themes_root.to_path_buf(),
            source,
        })?;

    let mut themes = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {e}", themes_root.display());
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!("Skipping non UTF-8 directory {}", path.display());
            continue;
        };

        if name.starts_with('.') || ignored.contains(&name) {
            continue;
        }

        if !path.join(marker).exists() {
            debug!("Skipping {name}: no {marker}");
            continue;
        }

        themes.push(ThemeProject::new(name, path));
    }

    themes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(themes)
}

/// Locate a single named theme for the explicit build/lint commands
///
/// Only the directory must exist; the marker file is not required.
pub fn find_theme(themes_root: &Path, name: &str) -> Result<ThemeProject, OrchestratorError> {
    validate_theme_name(name)?;

    let path = themes_root.join(name);
    if !path.is_dir() {
        return Err(OrchestratorError::ThemeNotFound {
            theme: name.to_string(),
            path,
        });
    }

    Ok(ThemeProject::new(name, path))
}
