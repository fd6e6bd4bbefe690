//! Structured error types for acquisition.
//!
//! Every failure an adapter, the walker or a sink can produce is an
//! [`AcquireError`]. Each variant belongs to one of the coarse [`ErrorKind`]
//! classes that outcome reporting is keyed on.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error raised while acquiring or persisting one series.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AcquireError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("hard stop: provider has blocked requests (circuit breaker open for '{venue}')")]
    CircuitBreakerTripped { venue: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl AcquireError {
    /// Coarse class used for outcome reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_)
            | Self::RateLimited { .. }
            | Self::CircuitBreakerTripped { .. }
            | Self::ResponseFormatChanged(_) => ErrorKind::Transport,
            Self::Render(_) => ErrorKind::Render,
            Self::Write(_) => ErrorKind::Write,
            Self::Config(_) => ErrorKind::Config,
            Self::ContractViolation(_) => ErrorKind::ContractViolation,
        }
    }

    /// Whether the walker may retry the request that produced this error.
    ///
    /// Only plain transport failures and rate limiting qualify. A tripped
    /// breaker stays open for minutes, so retrying it just burns the budget.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited { .. })
    }
}

/// Failure classes reported per series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Render,
    Write,
    Config,
    ContractViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transport => "transport",
            Self::Render => "render",
            Self::Write => "write",
            Self::Config => "config",
            Self::ContractViolation => "contract_violation",
        };
        f.write_str(s)
    }
}
