pub mod loop_;

pub use loop_::{AgentLoop, LoopOutcome, RunOptions, ToolCallEndHook, ToolCallStartHook};
