//! Errors raised before any series is dispatched.
//!
//! Once the fan-out is running, failures belong to a single series and are
//! reported as outcomes instead.

use marketwalk_core::AcquireError;
use std::path::PathBuf;
use thiserror::Error;

use crate::fanout::PoolError;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid task list {path}: {reason}")]
    TaskList { path: PathBuf, reason: String },

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
