//! Stable exit codes for agent-maker CLI commands.

/// Command succeeded; for `run`, the agent produced a final answer.
pub const OK: i32 = 0;
/// Invalid config, spec, tool name, provider failure or other errors.
pub const INVALID: i32 = 1;
/// `agent-maker run` spent its step budget without a final answer.
pub const INCOMPLETE: i32 = 2;
