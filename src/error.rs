//! Host-facing errors and internal assertion failures.
//!
//! Neither of these is a JavaScript exception: script-level errors travel as
//! `Completion::Throw`. `EngineError` reports misuse of the embedding API;
//! `InternalError` describes a broken engine invariant and aborts.

use crate::interpreter::ContextId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// `resume` was called while no top-level computation is paused
    #[error("no paused computation to resume")]
    NotPaused,

    /// a new top-level evaluation was started while one is paused
    #[error("a paused computation must be resumed before starting another")]
    AlreadyPaused,

    /// the context handle does not name a suspended execution context
    #[error("execution context {0} is not suspended")]
    ContextNotSuspended(ContextId),

    /// the agent schedules through a custom host; drain that host instead
    #[error("agent has no bundled job queue")]
    NoJobQueue,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid syntax tree: {0}")]
    SyntaxTree(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum InternalError {
    #[error("internal error: {0}")]
    Assertion(String),
}

/// Log and abort on a violated engine invariant.
#[cold]
#[track_caller]
pub fn internal_failure(message: String) -> ! {
    let err = InternalError::Assertion(message);
    tracing::error!(%err, "engine invariant violated");
    panic!("{err}");
}

#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::error::internal_failure(format!($($arg)*))
    };
}
