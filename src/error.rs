use std::path::PathBuf;
use thiserror::Error;

/// Orchestration error types
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Theme directory not found: {path}")]
    DirectoryNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Theme not available: {theme} ({path} does not exist)")]
    ThemeNotFound { theme: String, path: PathBuf },

    #[error("Mirror artifact not found: {path}")]
    MirrorNotFound { path: PathBuf },

    #[error("Failed to read mirror entry under {path}")]
    MirrorReadFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("No space left on device for {path}")]
    DiskFull { path: PathBuf },

    #[error("Failed to copy {src} to {dst}")]
    CopyFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory: {path}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start `{program}`")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Usage-level errors: the caller asked for something that cannot exist
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvalidInput(_) | OrchestratorError::ThemeNotFound { .. }
        )
    }
}
