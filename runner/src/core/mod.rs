//! Deterministic, pure logic for fleet reconciliation.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return byte-stable outputs suitable for tests.

pub mod assembler;
pub mod command_line;
pub mod declaration;
pub mod error;
pub mod fragments;
pub mod global_options;
pub mod reconcile;
pub mod repo;
pub mod types;
pub mod validate;
