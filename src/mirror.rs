//! Restore of previously built theme output from the deployment mirror.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::OrchestratorError;
use crate::theme::ThemeProject;

/// ENOSPC on Unix
const ENOSPC: i32 = 28;

/// Files and bytes written by a restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub files: u64,
    pub bytes: u64,
}

/// Anything that can put a theme's built output in place without building it
pub trait ArtifactSource {
    fn restore(&self, theme: &ThemeProject) -> Result<RestoreStats, OrchestratorError>;
}

/// A parallel tree of previously deployed artifacts
///
/// The mirror of a theme path is found by swapping the `live_root` prefix
/// for `mirror_root`.
#[derive(Debug, Clone)]
pub struct ArtifactMirror {
    live_root: PathBuf,
    mirror_root: PathBuf,
    output_dirs: Vec<PathBuf>,
}

impl ArtifactMirror {
    pub fn new(
        live_root: impl Into<PathBuf>,
        mirror_root: impl Into<PathBuf>,
        output_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            live_root: live_root.into(),
            mirror_root: mirror_root.into(),
            output_dirs,
        }
    }

    /// Mirror location of a path under the live root
    pub fn mirror_path(&self, live_path: &Path) -> Result<PathBuf, OrchestratorError> {
        let relative = live_path.strip_prefix(&self.live_root).map_err(|_| {
            OrchestratorError::InvalidInput(format!(
                "{} is outside {}",
                live_path.display(),
                self.live_root.display()
            ))
        })?;
        Ok(self.mirror_root.join(relative))
    }
}

impl ArtifactSource for ArtifactMirror {
    /// Copy every output directory of the mirrored theme over the live one
    ///
    /// All source directories are checked before anything is written.
    fn restore(&self, theme: &ThemeProject) -> Result<RestoreStats, OrchestratorError> {
        let mirror_theme = self.mirror_path(&theme.path)?;

        let mut pairs = Vec::with_capacity(self.output_dirs.len());
        for dir in &self.output_dirs {
            let src = mirror_theme.join(dir);
            if !src.is_dir() {
                return Err(OrchestratorError::MirrorNotFound { path: src });
            }
            pairs.push((src, theme.path.join(dir)));
        }

        let mut stats = RestoreStats::default();
        for (src, dst) in pairs {
            debug!("Copying {} to {}", src.display(), dst.display());
            let (files, bytes) = copy_directory(&src, &dst)?;
            stats.files += files;
            stats.bytes += bytes;
        }
        Ok(stats)
    }
}

fn create_dir(path: &Path) -> Result<(), OrchestratorError> {
    fs::create_dir_all(path).map_err(|e| {
        if e.raw_os_error() == Some(ENOSPC) {
            return OrchestratorError::DiskFull {
                path: path.to_path_buf(),
            };
        }
        OrchestratorError::CreateDirFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Copy a single file from src to dst, overwriting dst
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, OrchestratorError> {
    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            create_dir(parent)?;
        }
    }

    fs::copy(src, dst).map_err(|e| {
        if e.raw_os_error() == Some(ENOSPC) {
            return OrchestratorError::DiskFull {
                path: dst.to_path_buf(),
            };
        }
        OrchestratorError::CopyFailed {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source: e,
        }
    })
}

/// Copy directory recursively with overwrite, returns (files_copied, bytes_copied)
///
/// Files already in `dst` but absent from `src` are left alone.
pub fn copy_directory(src: &Path, dst: &Path) -> Result<(u64, u64), OrchestratorError> {
    let mut files_copied = 0u64;
    let mut bytes_copied = 0u64;

    create_dir(dst)?;

    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|source| OrchestratorError::MirrorReadFailed {
            path: src.to_path_buf(),
            source,
        })?;

        let src_path = entry.path();
        let relative = src_path.strip_prefix(src).unwrap_or(src_path);
        let dst_path = dst.join(relative);

        if entry.file_type().is_dir() {
            if !dst_path.exists() {
                create_dir(&dst_path)?;
            }
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }

        let bytes = copy_file(src_path, &dst_path)?;
        files_copied += 1;
        bytes_copied += bytes;
    }

    Ok((files_copied, bytes_copied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Layout {
        _temp: TempDir,
        live: PathBuf,
        mirror: PathBuf,
    }

    fn layout() -> Layout {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("docroot");
        let mirror = temp.path().join("deploy").join("docroot");
        fs::create_dir_all(live.join("themes/custom/site")).unwrap();
        Layout {
            _temp: temp,
            live,
            mirror,
        }
    }

    fn site(l: &Layout) -> ThemeProject {
        ThemeProject::new("site", l.live.join("themes/custom/site"))
    }

    fn css_only(l: &Layout) -> ArtifactMirror {
        ArtifactMirror::new(&l.live, &l.mirror, vec![PathBuf::from("css")])
    }

    #[test]
    fn test_mirror_path_substitutes_root() {
        let mirror = ArtifactMirror::new("/app/docroot", "/app/deploy/docroot", vec![]);
        let path = mirror
            .mirror_path(Path::new("/app/docroot/themes/custom/site"))
            .unwrap();
        assert_eq!(path, PathBuf::from("/app/deploy/docroot/themes/custom/site"));
    }

    #[test]
    fn test_mirror_path_outside_live_root() {
        let mirror = ArtifactMirror::new("/app/docroot", "/app/deploy/docroot", vec![]);
        let result = mirror.mirror_path(Path::new("/elsewhere/site"));
        assert!(matches!(result, Err(OrchestratorError::InvalidInput(_))));
    }

    #[test]
    fn test_restore_copies_nested_output() {
        let l = layout();
        let src = l.mirror.join("themes/custom/site/css/components");
        fs::create_dir_all(&src).unwrap();
        fs::write(l.mirror.join("themes/custom/site/css/styles.css"), "body{}").unwrap();
        fs::write(src.join("button.css"), ".btn{}").unwrap();

        let stats = css_only(&l).restore(&site(&l)).unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 12);
        let css = l.live.join("themes/custom/site/css");
        assert_eq!(fs::read_to_string(css.join("styles.css")).unwrap(), "body{}");
        assert!(css.join("components/button.css").exists());
    }

    #[test]
    fn test_restore_overwrites_existing_files() {
        let l = layout();
        let mirror_css = l.mirror.join("themes/custom/site/css");
        fs::create_dir_all(&mirror_css).unwrap();
        fs::write(mirror_css.join("styles.css"), "new").unwrap();

        let live_css = l.live.join("themes/custom/site/css");
        fs::create_dir_all(&live_css).unwrap();
        fs::write(live_css.join("styles.css"), "old").unwrap();
        fs::write(live_css.join("extra.css"), "keep").unwrap();

        css_only(&l).restore(&site(&l)).unwrap();

        assert_eq!(fs::read_to_string(live_css.join("styles.css")).unwrap(), "new");
        assert_eq!(fs::read_to_string(live_css.join("extra.css")).unwrap(), "keep");
    }

    #[test]
    fn test_restore_missing_mirror_fails() {
        let l = layout();
        let result = css_only(&l).restore(&site(&l));
        assert!(matches!(result, Err(OrchestratorError::MirrorNotFound { .. })));
    }

    #[test]
    fn test_restore_checks_all_dirs_before_copying() {
        let l = layout();
        let mirror_css = l.mirror.join("themes/custom/site/css");
        fs::create_dir_all(&mirror_css).unwrap();
        fs::write(mirror_css.join("styles.css"), "x").unwrap();

        let mirror = ArtifactMirror::new(
            &l.live,
            &l.mirror,
            vec![PathBuf::from("css"), PathBuf::from("js")],
        );
        let result = mirror.restore(&site(&l));

        assert!(matches!(result, Err(OrchestratorError::MirrorNotFound { .. })));
        assert!(!l.live.join("themes/custom/site/css").exists());
    }

    #[test]
    fn test_restore_empty_output_dir() {
        let l = layout();
        fs::create_dir_all(l.mirror.join("themes/custom/site/css")).unwrap();

        let stats = css_only(&l).restore(&site(&l)).unwrap();

        assert_eq!(stats, RestoreStats::default());
        assert!(l.live.join("themes/custom/site/css").is_dir());
    }

    #[test]
    fn test_copy_file_creates_parent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.css");
        fs::write(&src, "abc").unwrap();
        let dst = temp.path().join("deep/nested/a.css");

        let bytes = copy_file(&src, &dst).unwrap();

        assert_eq!(bytes, 3);
        assert!(dst.exists());
    }

    #[test]
    fn test_copy_file_missing_source() {
        let temp = TempDir::new().unwrap();
        let result = copy_file(&temp.path().join("nope"), &temp.path().join("out"));
        assert!(matches!(result, Err(OrchestratorError::CopyFailed { .. })));
    }
}
