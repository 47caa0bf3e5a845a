//! Side-effecting helpers: filesystem, processes, providers, configuration.

pub mod config;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod spec_file;
pub mod trace_store;
pub mod workspace;
