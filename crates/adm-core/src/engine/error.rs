//! Transfer error kinds and the retry decision for each.
//!
//! One place decides retry vs terminal; the streaming code just returns
//! tagged errors upward.

use std::time::Duration;

use crate::client::ClientError;

/// What went wrong with one transfer attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Remote flow-control with a suggested wait.
    #[error("flood wait {seconds}s")]
    FlowControl { seconds: u64 },

    /// Network/RPC failure, including wall-clock timeouts.
    #[error("transport: {0}")]
    Transport(String),

    /// Local disk failed (full, permission denied). Terminal.
    #[error("filesystem: {0}")]
    Filesystem(String),

    /// Cancellation requested; progress is kept for resume.
    #[error("cancelled")]
    Cancelled,

    /// Anything unexpected. Terminal for this run.
    #[error("{0}")]
    Other(String),
}

impl From<ClientError> for TransferError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::FloodWait { seconds } => TransferError::FlowControl { seconds },
            ClientError::Transport(msg) => TransferError::Transport(msg),
            ClientError::Cancelled => TransferError::Cancelled,
            ClientError::Filesystem(io) => TransferError::Filesystem(io.to_string()),
            ClientError::NotFound(what) => TransferError::Other(format!("not found: {what}")),
            ClientError::InvalidDescriptor(d) => {
                TransferError::Other(format!("invalid descriptor: {d}"))
            }
        }
    }
}

/// Decision for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then run the attempt again.
    RetryAfter(Duration),
    /// Stop retrying within this invocation.
    GiveUp,
}

/// Classify a failed attempt. `attempt` is 1-based; `retry_limit` bounds
/// attempts within one invocation (the cumulative ceiling is checked at
/// admission).
pub fn retry_decision(err: &TransferError, attempt: u32, retry_limit: u32) -> RetryDecision {
    if attempt >= retry_limit {
        return RetryDecision::GiveUp;
    }
    match err {
        // The server told us how long to stay away.
        TransferError::FlowControl { seconds } => {
            RetryDecision::RetryAfter(Duration::from_secs(*seconds))
        }
        // Exponential backoff capped at a minute.
        TransferError::Transport(_) => {
            let secs = 2u64.saturating_pow(attempt).min(60);
            RetryDecision::RetryAfter(Duration::from_secs(secs))
        }
        TransferError::Filesystem(_) | TransferError::Cancelled | TransferError::Other(_) => {
            RetryDecision::GiveUp
        }
    }
}
