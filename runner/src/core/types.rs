//! Shared deterministic types for the fleet core.
//!
//! These types define stable contracts between core components. They carry no
//! I/O and must serialize identically across runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Desired presence of a runner registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Observed registration status for a runner name.
///
/// `Unknown` marks a runner whose last action failed; the next pass re-issues
/// the action for its desired state instead of assuming it converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    Registered,
    Unregistered,
    Unknown,
}

/// Declared runner registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSpec {
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// Flags passed to `register` as `--<key>=<value>`, in key order.
    #[serde(default)]
    pub registration_args: BTreeMap<String, String>,
    /// Explicit fragment order; runners default to [`RUNNER_ORDER`].
    #[serde(default)]
    pub order: Option<i64>,
}

impl RunnerSpec {
    pub fn new(name: impl Into<String>, ensure: Ensure) -> Self {
        Self {
            name: name.into(),
            ensure,
            registration_args: BTreeMap::new(),
            order: None,
        }
    }
}

/// Fragment order of the managed-file header.
pub const HEADER_ORDER: i64 = 0;
/// Fragment order of the global options stanza.
pub const GLOBAL_OPTIONS_ORDER: i64 = 1;
/// Default (and minimum) fragment order for runner fragments.
pub const RUNNER_ORDER: i64 = 2;

/// One action emitted by a reconciliation pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    Register {
        name: String,
        args: BTreeMap<String, String>,
    },
    Unregister {
        name: String,
    },
    NoOp {
        name: String,
    },
}

impl ReconcileAction {
    pub fn name(&self) -> &str {
        match self {
            Self::Register { name, .. } | Self::Unregister { name } | Self::NoOp { name } => name,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp { .. })
    }

    /// Status the runner reaches once this action exits successfully.
    pub fn resulting_status(&self) -> Option<RunnerStatus> {
        match self {
            Self::Register { .. } => Some(RunnerStatus::Registered),
            Self::Unregister { .. } => Some(RunnerStatus::Unregistered),
            Self::NoOp { .. } => None,
        }
    }
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { name, .. } => write!(f, "register {name}"),
            Self::Unregister { name } => write!(f, "unregister {name}"),
            Self::NoOp { name } => write!(f, "noop {name}"),
        }
    }
}

/// Host OS family, as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Debian,
    RedHat,
    Other,
}

impl OsFamily {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "debian" => Self::Debian,
            "redhat" => Self::RedHat,
            _ => Self::Other,
        }
    }
}
