//! Minimal agent runtime.
//!
//! An [`agent::Agent`] owns a conversation, a [`tools::ToolRegistry`] and a
//! model provider. Each step sends `[system] + history` to the provider,
//! parses one decision out of the reply, and applies it. The
//! [`runner::Runner`] drives steps under a budget and persists a redacted
//! trace per run.
//!
//! - **[`core`]**: Pure logic (conversation state, decision parsing, redaction,
//!   specs). No I/O.
//! - **[`io`]**: Side effects (config, processes, workspace paths, providers,
//!   trace files, prompt rendering).
//! - **[`tools`]**: Built-in tools behind a name-keyed registry.
//!
//! [`design`] wires a designer agent that turns a prompt into an agent spec.

pub mod agent;
pub mod core;
pub mod design;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
