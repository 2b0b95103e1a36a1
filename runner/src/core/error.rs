//! Typed error taxonomy for a reconciliation pass.
//!
//! All variants implement `thiserror::Error` and convert into `anyhow::Error`
//! via `?` at the orchestration layer.

use thiserror::Error;

/// Declaration rejected before any fragment is written or command is run.
///
/// Carries every violation found so a single pass reports them all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid declaration:\n- {}", .violations.join("\n- "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

/// Internal invariant violated while building the managed file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("duplicate fragment '{name}' for target {target}")]
    DuplicateFragment { target: String, name: String },
}

/// An external command failed for one runner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{action} {runner} failed: {reason}")]
pub struct ActionFailure {
    pub runner: String,
    pub action: &'static str,
    pub reason: String,
}

/// Non-zero exit (or no exit at all) from an external command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExitFailure {
    #[error("exited with status {code:?}: {stderr}")]
    Status { code: Option<i32>, stderr: String },
    #[error("timed out after {secs}s")]
    TimedOut { secs: u64 },
    #[error("could not run command: {0}")]
    Spawn(String),
}
