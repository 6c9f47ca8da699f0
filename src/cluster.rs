// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! The abstract cluster handle the transactional client drives.
//!
//! Transport, routing, and wire encoding live behind this trait; the client
//! only sees typed operations and typed errors. Transient failures surface as
//! [`Error::Retryable`](crate::Error::Retryable) tagged with a backoff
//! category, lock conflicts as [`Error::KeyIsLocked`](crate::Error::KeyIsLocked).

use async_trait::async_trait;
use derive_new::new;

use crate::Key;
use crate::KvPair;
use crate::Mutation;
use crate::Result;
use crate::Value;

/// Default time-to-live of a provisional lock, in milliseconds.
///
/// A lock older than its TTL may be rolled back by any reader or writer that
/// encounters it, so an abandoned transaction cannot block others forever.
pub const DEFAULT_LOCK_TTL_MS: u64 = 3_000;

/// A provisional lock record written during prewrite.
///
/// The record for the elected primary key has `primary == key`; every other
/// record references the primary, which is the single source of truth for
/// whether the transaction committed.
#[derive(new, Clone, Debug, Eq, PartialEq)]
pub struct LockRecord {
    /// The provisional write, with an empty value as tombstone.
    pub mutation: Mutation,
    pub primary: Key,
    /// The transaction's start timestamp.
    pub ts: u64,
    pub ttl_ms: u64,
}

/// Metadata of a live lock, as surfaced in a conflict.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lock {
    pub key: Key,
    pub primary: Key,
    /// Start timestamp of the owning transaction.
    pub ts: u64,
    pub ttl_ms: u64,
}

/// Commit state of a transaction, as learned from its primary key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxnStatus {
    /// The primary committed at this commit timestamp.
    Committed(u64),
    /// The primary's lock was rolled back, or never existed.
    RolledBack,
    /// The primary's lock is live and within its TTL.
    Locked,
}

/// A handle to the storage cluster and its timestamp authority.
///
/// The handle is externally owned and outlives every committer and snapshot;
/// components borrow it rather than owning it.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Obtain a globally ordered, monotonically increasing timestamp.
    async fn allocate_timestamp(&self) -> Result<u64>;

    /// Write one provisional lock record.
    ///
    /// Fails with `KeyIsLocked` if another transaction holds a live lock on
    /// the key, and with `TxnNotFound` if this transaction was already rolled
    /// back at this key (a rollback marker blocks late prewrites).
    async fn prewrite(&self, record: LockRecord) -> Result<()>;

    /// Replace the lock written at `start_ts` with a commit record at
    /// `commit_ts`.
    ///
    /// Fails with `TxnNotFound` when there is neither a matching lock nor an
    /// existing commit record for the transaction at this key.
    async fn commit(&self, key: &Key, start_ts: u64, commit_ts: u64) -> Result<()>;

    /// Erase the lock written at `start_ts` and leave a rollback marker.
    ///
    /// Erasing an absent lock is a success; the marker is written either way.
    async fn erase_lock(&self, key: &Key, start_ts: u64) -> Result<()>;

    /// Read the newest committed value with commit timestamp `<= ts`.
    ///
    /// Fails with `KeyIsLocked` if a lock with start timestamp `<= ts` is in
    /// the way; the caller must resolve it and retry.
    async fn read(&self, key: &Key, ts: u64) -> Result<Option<Value>>;

    /// The multi-key form of [`read`](Cluster::read). Keys with no visible
    /// value are absent from the result.
    async fn batch_read(&self, keys: &[Key], ts: u64) -> Result<Vec<KvPair>>;

    /// Consult a transaction's primary key to learn its commit state.
    ///
    /// If the primary's lock has outlived its TTL, the cluster rolls it back
    /// and reports `RolledBack`.
    async fn check_txn_status(&self, primary: &Key, start_ts: u64) -> Result<TxnStatus>;
}
