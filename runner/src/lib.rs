//! Declarative manager for a host's fleet of CI runner registrations.
//!
//! The crate assembles the agent's single configuration file from ordered
//! fragments and reconciles declared runners against their registration state.
//!
//! - **[`core`]**: Pure, deterministic logic (fragment ordering, settings
//!   rendering, reconciliation decisions, validation). No I/O.
//! - **[`io`]**: Side-effecting adapters (config and state files, child
//!   processes, the external command gateway).
//!
//! [`apply`] coordinates the two to implement a reconciliation pass.

pub mod apply;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
