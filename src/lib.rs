//! # Theme Orchestrator
//!
//! Build, restore and lint orchestration for front-end themes in CI.
//!
//! Every theme under the themes root is either rebuilt with its own build
//! command or, on a CI push that did not touch it, restored from a parallel
//! deployment mirror. Commands run strictly one after another and the first
//! failure stops the queue.
//!
//! ## Features
//!
//! - Theme discovery by marker file with separate build and lint ignore sets
//! - Build-or-restore decisions from GitHub Actions change signals
//! - Restore with automatic fallback to a full build
//! - Sequential stop-on-fail execution with an aggregated exit code
//!
//! ## Usage
//!
//! ```ignore
//! use theme_orchestrator::orchestrator::Orchestrator;
//! use theme_orchestrator::signal::ChangeContext;
//!
//! let run = Orchestrator::new(&config, &runner, &shutdown)
//!     .build_all_themes(&ChangeContext::from_env())?;
//! ```

/// CLI configuration and argument parsing
pub mod config;

/// Build-or-restore decisions and build queue
pub mod decision;

/// Error types for orchestration
pub mod error;

/// Sequential command execution
pub mod executor;

/// Artifact restore from the deployment mirror
pub mod mirror;

/// Command entry points
pub mod orchestrator;

/// Theme directory discovery
pub mod scanner;

/// CI change signals
pub mod signal;

/// Theme and ignore-set types
pub mod theme;
