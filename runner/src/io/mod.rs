//! I/O adapters: config, declaration and state files, processes, the gateway.

pub mod config;
pub mod declaration;
pub mod gateway;
pub mod managed_file;
pub mod process;
pub mod state_store;
