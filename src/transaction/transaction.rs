// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::mem;

use log::debug;
use log::warn;

use crate::cluster::Cluster;
use crate::internal_err;
use crate::transaction::committer::TwoPhaseCommitter;
use crate::Error;
use crate::Key;
use crate::Result;
use crate::Value;

/// A buffered read-write transaction: the single-actor convenience wrapper
/// over [`TwoPhaseCommitter`].
///
/// Writes are buffered client-side; nothing reaches the cluster until
/// [`commit`](Transaction::commit), which builds exactly one committer over
/// the buffered mutation set and drives it through prewrite and commit. The
/// first key written becomes the primary.
pub struct Transaction<'a, C: Cluster + ?Sized> {
    cluster: &'a C,
    buffer: HashMap<Key, Value>,
    primary: Option<Key>,
    start_ts: Option<u64>,
    commit_ts: Option<u64>,
    committed: bool,
}

impl<'a, C: Cluster + ?Sized> Transaction<'a, C> {
    pub fn new(cluster: &'a C) -> Self {
        Self {
            cluster,
            buffer: HashMap::new(),
            primary: None,
            start_ts: None,
            commit_ts: None,
            committed: false,
        }
    }

    /// Buffer a write. An empty value deletes the key.
    pub fn set(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        if self.committed {
            return Err(Error::OperationAfterCommit);
        }
        let key = key.into();
        if self.primary.is_none() {
            self.primary = Some(key.clone());
        }
        self.buffer.insert(key, value.into());
        Ok(())
    }

    /// Buffer a delete of the key.
    pub fn delete(&mut self, key: impl Into<Key>) -> Result<()> {
        self.set(key, Vec::new())
    }

    /// Commit the buffered mutation set.
    ///
    /// On a failure before the primary commits, the written locks are rolled
    /// back best-effort before the error is returned, so a failed commit
    /// leaves no decision behind and no locks for other writers to wait out:
    /// either the primary committed and this returns `Ok`, or it did not and
    /// the transaction is dead.
    pub async fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(Error::OperationAfterCommit);
        }
        self.committed = true;

        if self.buffer.is_empty() {
            debug!("committing an empty transaction is a no-op");
            return Ok(());
        }
        let primary = self
            .primary
            .clone()
            .ok_or_else(|| internal_err!("non-empty buffer without a primary key"))?;

        let mut committer =
            TwoPhaseCommitter::new(self.cluster, primary, mem::take(&mut self.buffer));
        if let Err(err) = committer.prewrite_keys(None).await {
            if let Err(rollback_err) = committer.rollback().await {
                warn!("rollback after failed prewrite failed too: {rollback_err}");
            }
            return Err(err);
        }
        self.start_ts = Some(committer.start_ts());

        if let Err(err) = committer.commit_keys().await {
            if committer.commit_ts().is_none() {
                if let Err(rollback_err) = committer.rollback().await {
                    warn!("rollback after failed commit failed too: {rollback_err}");
                }
            }
            return Err(err);
        }
        self.commit_ts = committer.commit_ts();
        Ok(())
    }

    /// The start timestamp, once prewrite has begun.
    pub fn start_ts(&self) -> Option<u64> {
        self.start_ts
    }

    /// The commit timestamp, once committed.
    pub fn commit_ts(&self) -> Option<u64> {
        self.commit_ts
    }
}
