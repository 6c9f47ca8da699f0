// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::result;

use thiserror::Error;

use crate::backoff::BackoffKind;
use crate::cluster::Lock;

/// An error originating from the transaction client or the cluster it talks to.
#[derive(Debug, Error)]
pub enum Error {
    /// Another transaction holds a live lock on the key.
    ///
    /// Carries the conflicting lock's metadata so the caller can consult its
    /// primary and decide whether to roll it forward, clean it up, or wait.
    #[error("key is locked: {0:?}")]
    KeyIsLocked(Lock),

    /// Transient error returned by the cluster, tagged with the backoff
    /// category that paces its retries.
    #[error("retryable error ({kind}): {message}")]
    Retryable {
        kind: BackoffKind,
        message: String,
    },

    /// No lock and no commit record for the transaction at this key.
    ///
    /// Fatal when hit on the primary at commit time: the lock was rolled
    /// back (or expired and cleaned up) by someone else, so the transaction
    /// is dead.
    #[error("txn {start_ts} not found")]
    TxnNotFound { start_ts: u64 },

    /// The attempt's total sleep budget was exceeded. Not retryable.
    #[error("backoff exhausted after {total_sleep_ms}ms: {cause}")]
    BackoffExhausted {
        total_sleep_ms: u64,
        #[source]
        cause: Box<Error>,
    },

    /// The operation is not legal in the committer's current state.
    #[error("cannot {op} in {state} state")]
    InvalidState {
        op: &'static str,
        state: &'static str,
    },

    /// It's not allowed to mutate a transaction after it has been committed.
    #[error("cannot read or write data after any attempt to commit the transaction")]
    OperationAfterCommit,

    #[error("{message}")]
    InternalError { message: String },
}

impl Error {
    /// The backoff category to retry this error under, or `None` if the
    /// error is not transient.
    pub fn retry_kind(&self) -> Option<BackoffKind> {
        match self {
            Error::Retryable { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_backoff_exhausted(&self) -> bool {
        matches!(self, Error::BackoffExhausted { .. })
    }
}

/// A result holding an [`Error`](enum@Error).
pub type Result<T> = result::Result<T, Error>;

#[doc(hidden)]
#[macro_export]
macro_rules! internal_err {
    ($e:expr) => ({
        $crate::Error::InternalError {
            message: format!("[{}:{}]: {}", file!(), line!(),  $e)
        }
    });
    ($f:tt, $($arg:expr),+) => ({
        $crate::internal_err!(format!($f, $($arg),+))
    });
}
