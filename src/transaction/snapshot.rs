// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;

use log::debug;
use log::trace;

use crate::backoff::BackoffKind;
use crate::backoff::Backoffer;
use crate::backoff::GET_MAX_BACKOFF_MS;
use crate::cluster::Cluster;
use crate::transaction::lock::resolve_lock;
use crate::Error;
use crate::Key;
use crate::Result;
use crate::Value;

/// A read-only view of the cluster as of a fixed timestamp.
///
/// All reads through one snapshot observe the same committed state: the
/// newest version with a commit timestamp at or below the snapshot's, and
/// nothing that commits later. Locks left by in-flight or abandoned
/// transactions are resolved inline, so committed-but-unlocked data is always
/// visible and uncommitted values never leak.
pub struct Snapshot<'a, C: Cluster + ?Sized> {
    cluster: &'a C,
    version: u64,
}

impl<'a, C: Cluster + ?Sized> Snapshot<'a, C> {
    /// Create a snapshot at the given timestamp, or at "now" (a fresh
    /// timestamp from the authority) when `ts` is `None`.
    pub async fn new(cluster: &'a C, ts: Option<u64>) -> Result<Self> {
        let version = match ts {
            Some(ts) => ts,
            None => {
                let mut bo = Backoffer::new(GET_MAX_BACKOFF_MS);
                loop {
                    match cluster.allocate_timestamp().await {
                        Ok(ts) => break ts,
                        Err(err) => match err.retry_kind() {
                            Some(kind) => bo.backoff(kind, err).await?,
                            None => return Err(err),
                        },
                    }
                }
            }
        };
        Ok(Self { cluster, version })
    }

    /// The timestamp this snapshot reads at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get the value visible at this snapshot's timestamp.
    ///
    /// Returns `None` if the key has no visible version or was last written
    /// as a delete.
    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        trace!("invoking get request on snapshot at {}", self.version);

        let mut bo = Backoffer::new(GET_MAX_BACKOFF_MS);
        loop {
            match self.cluster.read(&key, self.version).await {
                Ok(value) => return Ok(value),
                Err(Error::KeyIsLocked(lock)) => {
                    resolve_lock(&mut bo, self.cluster, &lock, BackoffKind::TxnLockFast).await?;
                }
                Err(err) => match err.retry_kind() {
                    Some(kind) => bo.backoff(kind, err).await?,
                    None => return Err(err),
                },
            }
        }
    }

    /// The multi-key form of [`get`](Snapshot::get).
    ///
    /// The result contains only keys that resolve to a non-empty value; keys
    /// with no visible version are absent.
    pub async fn batch_get(
        &self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Result<HashMap<Key, Value>> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        debug!(
            "invoking batch_get over {} keys on snapshot at {}",
            keys.len(),
            self.version
        );

        let mut bo = Backoffer::new(GET_MAX_BACKOFF_MS);
        loop {
            match self.cluster.batch_read(&keys, self.version).await {
                Ok(pairs) => {
                    return Ok(pairs.into_iter().map(|pair| pair.into_key_value()).collect());
                }
                Err(Error::KeyIsLocked(lock)) => {
                    resolve_lock(&mut bo, self.cluster, &lock, BackoffKind::TxnLockFast).await?;
                }
                Err(err) => match err.retry_kind() {
                    Some(kind) => bo.backoff(kind, err).await?,
                    None => return Err(err),
                },
            }
        }
    }
}
