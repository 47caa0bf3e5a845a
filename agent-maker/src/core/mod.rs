//! Pure logic shared by the agent runtime.
//!
//! Core modules are free of I/O. They operate on in-memory conversation state
//! and JSON values and are exercised directly by unit tests.

pub mod decision;
pub mod ids;
pub mod redact;
pub mod spec;
pub mod state;
pub mod types;
