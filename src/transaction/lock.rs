// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Lock resolution shared by the committer's prewrite path and the snapshot
//! read path.

use log::debug;

use crate::backoff::BackoffKind;
use crate::backoff::Backoffer;
use crate::cluster::Cluster;
use crate::cluster::Lock;
use crate::cluster::TxnStatus;
use crate::Error;
use crate::Result;

/// Resolve a live lock encountered by the calling attempt.
///
/// Consults the lock's primary key for the owning transaction's fate:
/// committed locks are rolled forward to their commit timestamp, rolled-back
/// locks are erased, and in-doubt locks cost one backoff under `kind`
/// (`TxnLock` for writers, `TxnLockFast` for readers).
///
/// Returns `Ok(())` to signal "retry the blocked operation now"; the caller's
/// retry will either pass or surface the next obstacle. The backoffer is the
/// calling attempt's, so resolution shares its sleep budget.
pub(crate) async fn resolve_lock<C: Cluster + ?Sized>(
    bo: &mut Backoffer,
    cluster: &C,
    lock: &Lock,
    kind: BackoffKind,
) -> Result<()> {
    let status = match cluster.check_txn_status(&lock.primary, lock.ts).await {
        Ok(status) => status,
        Err(err) => return retry_or_die(bo, err).await,
    };

    match status {
        TxnStatus::Committed(commit_ts) => {
            debug!(
                "rolling forward lock on {:?} (start_ts {}) to commit_ts {commit_ts}",
                lock.key, lock.ts
            );
            match cluster.commit(&lock.key, lock.ts, commit_ts).await {
                Ok(()) => Ok(()),
                // Someone else rolled it forward first.
                Err(Error::TxnNotFound { .. }) => Ok(()),
                Err(err) => retry_or_die(bo, err).await,
            }
        }
        TxnStatus::RolledBack => {
            debug!(
                "cleaning up rolled-back lock on {:?} (start_ts {})",
                lock.key, lock.ts
            );
            match cluster.erase_lock(&lock.key, lock.ts).await {
                Ok(()) => Ok(()),
                Err(err) => retry_or_die(bo, err).await,
            }
        }
        TxnStatus::Locked => bo.backoff(kind, Error::KeyIsLocked(lock.clone())).await,
    }
}

async fn retry_or_die(bo: &mut Backoffer, err: Error) -> Result<()> {
    match err.retry_kind() {
        Some(kind) => bo.backoff(kind, err).await,
        None => Err(err),
    }
}
