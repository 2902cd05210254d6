//! Control-flow and completion core of an ECMAScript engine.
//!
//! Every evaluation is a resumable computation that can suspend for
//! `await`, `yield` or a debugger checkpoint and be resumed later with a
//! message. Generators, async functions, async generators and promise jobs
//! are all built on that one mechanism.

pub mod ast;
pub mod completion;
pub mod error;
pub mod interpreter;
pub mod types;

pub use completion::Completion;
pub use error::EngineError;
pub use interpreter::{Agent, AgentOptions, CheckpointGranularity, Outcome};
pub use types::JsValue;
