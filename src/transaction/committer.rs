// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;

use log::debug;
use log::warn;

use crate::backoff::BackoffKind;
use crate::backoff::Backoffer;
use crate::backoff::COMMIT_MAX_BACKOFF_MS;
use crate::backoff::PREWRITE_MAX_BACKOFF_MS;
use crate::cluster::Cluster;
use crate::cluster::LockRecord;
use crate::cluster::DEFAULT_LOCK_TTL_MS;
use crate::transaction::lock::resolve_lock;
use crate::Error;
use crate::Key;
use crate::Mutation;
use crate::Result;
use crate::Value;

/// The join token produced by a successful prewrite.
///
/// A cooperating committer adopts `start_ts` (and prewrites its own key
/// subset against the same primary) to attach to the same transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrewriteResult {
    pub primary_lock: Key,
    pub start_ts: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Initialized,
    Prewriting,
    Prewritten,
    Committing,
    Committed,
    RolledBack,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Initialized => "initialized",
            State::Prewriting => "prewriting",
            State::Prewritten => "prewritten",
            State::Committing => "committing",
            State::Committed => "committed",
            State::RolledBack => "rolled back",
        }
    }
}

/// Drives one key subset of a transaction through two-phase commit.
///
/// The committer owns its mutation set and borrows the cluster handle. The
/// designated primary key carries the authoritative lock state; it does not
/// have to be part of this committer's own mutation set (an executor
/// committer references the scheduler's primary).
///
/// Several committers sharing one start timestamp may prewrite disjoint key
/// subsets concurrently; exactly one of them then drives the commit decision
/// for the whole transaction.
pub struct TwoPhaseCommitter<'a, C: Cluster + ?Sized> {
    cluster: &'a C,
    primary: Key,
    mutations: HashMap<Key, Value>,
    lock_ttl_ms: u64,
    start_ts: u64,
    commit_ts: Option<u64>,
    state: State,
}

impl<'a, C: Cluster + ?Sized> TwoPhaseCommitter<'a, C> {
    pub fn new(
        cluster: &'a C,
        primary: impl Into<Key>,
        mutations: impl IntoIterator<Item = (impl Into<Key>, impl Into<Value>)>,
    ) -> Self {
        Self {
            cluster,
            primary: primary.into(),
            mutations: mutations
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            start_ts: 0,
            commit_ts: None,
            state: State::Initialized,
        }
    }

    /// Override the TTL of the locks this committer writes.
    #[must_use]
    pub fn with_lock_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.lock_ttl_ms = ttl_ms;
        self
    }

    /// The transaction's start timestamp, or `0` before prewrite.
    pub fn start_ts(&self) -> u64 {
        self.start_ts
    }

    pub fn primary(&self) -> &Key {
        &self.primary
    }

    /// The commit timestamp, once the primary has committed.
    pub fn commit_ts(&self) -> Option<u64> {
        self.commit_ts
    }

    /// Phase 1: write a provisional lock for every key in the mutation set.
    ///
    /// Without `join_start_ts` a fresh start timestamp is obtained from the
    /// timestamp authority; with it, the committer attaches to a transaction
    /// already begun by another committer. The primary's lock (when this
    /// committer owns the primary) is written first.
    ///
    /// A fatal failure leaves whatever locks were already written in place;
    /// [`rollback`](TwoPhaseCommitter::rollback) is the recovery path.
    pub async fn prewrite_keys(&mut self, join_start_ts: Option<u64>) -> Result<PrewriteResult> {
        if self.state != State::Initialized {
            return Err(Error::InvalidState {
                op: "prewrite",
                state: self.state.name(),
            });
        }
        self.state = State::Prewriting;

        let mut bo = Backoffer::new(PREWRITE_MAX_BACKOFF_MS);
        self.start_ts = match join_start_ts {
            Some(ts) => ts,
            None => self.get_timestamp(&mut bo).await?,
        };
        debug!(
            "prewriting {} keys at start_ts {} (primary {:?})",
            self.mutations.len(),
            self.start_ts,
            self.primary
        );

        for key in self.keys_primary_first() {
            self.prewrite_one(&mut bo, &key).await?;
        }

        self.state = State::Prewritten;
        Ok(PrewriteResult {
            primary_lock: self.primary.clone(),
            start_ts: self.start_ts,
        })
    }

    /// Phase 2: commit the primary key, then the secondaries.
    ///
    /// The primary commit is the transaction's single decision point: once it
    /// succeeds the transaction is committed no matter what happens to the
    /// secondaries, and a missing primary lock means the transaction was
    /// rolled back by someone else and is dead. Secondary commits are
    /// best-effort; a reader that finds a stale secondary lock rolls it
    /// forward by consulting the committed primary.
    ///
    /// A failure before the primary commits leaves the committer prewritten,
    /// with its locks still in place: the caller may retry the commit or
    /// [`rollback`](TwoPhaseCommitter::rollback).
    pub async fn commit_keys(&mut self) -> Result<()> {
        if self.state != State::Prewritten {
            return Err(Error::InvalidState {
                op: "commit",
                state: self.state.name(),
            });
        }
        self.state = State::Committing;

        let mut bo = Backoffer::new(COMMIT_MAX_BACKOFF_MS);
        let commit_ts = match self.commit_primary(&mut bo).await {
            Ok(ts) => ts,
            Err(err @ Error::TxnNotFound { .. }) => {
                self.state = State::RolledBack;
                return Err(err);
            }
            Err(err) => {
                // The primary did not commit, so the prewrite locks are
                // still in place and the transaction is still undecided.
                self.state = State::Prewritten;
                return Err(err);
            }
        };
        self.commit_ts = Some(commit_ts);

        for key in self.secondary_keys() {
            self.commit_secondary(&mut bo, &key, commit_ts).await;
        }

        self.state = State::Committed;
        Ok(())
    }

    /// Erase every lock this committer wrote, at the start timestamp.
    ///
    /// Idempotent: rolling back twice, or after another actor already cleaned
    /// a lock up, succeeds. Safe after a partial prewrite failure.
    pub async fn rollback(&mut self) -> Result<()> {
        match self.state {
            State::RolledBack => return Ok(()),
            State::Committing | State::Committed => {
                return Err(Error::InvalidState {
                    op: "rollback",
                    state: self.state.name(),
                });
            }
            State::Initialized | State::Prewriting | State::Prewritten => {}
        }

        if self.start_ts == 0 {
            // Never obtained a timestamp, so no lock can exist.
            self.state = State::RolledBack;
            return Ok(());
        }

        debug!("rolling back {} keys at start_ts {}", self.mutations.len(), self.start_ts);
        let mut bo = Backoffer::new(PREWRITE_MAX_BACKOFF_MS);
        for key in self.keys_primary_first() {
            loop {
                match self.cluster.erase_lock(&key, self.start_ts).await {
                    Ok(()) => break,
                    Err(err) => match err.retry_kind() {
                        Some(kind) => bo.backoff(kind, err).await?,
                        None => return Err(err),
                    },
                }
            }
        }

        self.state = State::RolledBack;
        Ok(())
    }

    async fn prewrite_one(&self, bo: &mut Backoffer, key: &Key) -> Result<()> {
        let value = &self.mutations[key];
        loop {
            let record = LockRecord::new(
                Mutation::new(key.clone(), value.clone()),
                self.primary.clone(),
                self.start_ts,
                self.lock_ttl_ms,
            );
            match self.cluster.prewrite(record).await {
                Ok(()) => return Ok(()),
                Err(Error::KeyIsLocked(lock)) => {
                    if lock.ts == self.start_ts {
                        // A cooperating committer of the same transaction (or
                        // an earlier attempt of this one) already wrote it.
                        return Ok(());
                    }
                    resolve_lock(bo, self.cluster, &lock, BackoffKind::TxnLock).await?;
                }
                Err(err) => match err.retry_kind() {
                    Some(kind) => bo.backoff(kind, err).await?,
                    None => return Err(err),
                },
            }
        }
    }

    async fn commit_primary(&self, bo: &mut Backoffer) -> Result<u64> {
        let commit_ts = self.get_timestamp(bo).await?;
        debug!(
            "committing primary {:?} at commit_ts {commit_ts} (start_ts {})",
            self.primary, self.start_ts
        );
        loop {
            match self.cluster.commit(&self.primary, self.start_ts, commit_ts).await {
                Ok(()) => return Ok(commit_ts),
                Err(err) => match err.retry_kind() {
                    Some(kind) => bo.backoff(kind, err).await?,
                    None => return Err(err),
                },
            }
        }
    }

    async fn commit_secondary(&self, bo: &mut Backoffer, key: &Key, commit_ts: u64) {
        loop {
            match self.cluster.commit(key, self.start_ts, commit_ts).await {
                Ok(()) => return,
                Err(Error::TxnNotFound { .. }) => {
                    // A reader already resolved this lock against the primary.
                    debug!("secondary {key:?} already resolved");
                    return;
                }
                Err(err) => match err.retry_kind() {
                    Some(kind) => {
                        if let Err(err) = bo.backoff(kind, err).await {
                            warn!("giving up committing secondary {key:?}: {err}");
                            return;
                        }
                    }
                    None => {
                        warn!("committing secondary {key:?} failed: {err}");
                        return;
                    }
                },
            }
        }
    }

    async fn get_timestamp(&self, bo: &mut Backoffer) -> Result<u64> {
        loop {
            match self.cluster.allocate_timestamp().await {
                Ok(ts) => return Ok(ts),
                Err(err) => match err.retry_kind() {
                    Some(kind) => bo.backoff(kind, err).await?,
                    None => return Err(err),
                },
            }
        }
    }

    /// Keys of the mutation set, with the primary first when it is ours.
    fn keys_primary_first(&self) -> Vec<Key> {
        let mut keys = Vec::with_capacity(self.mutations.len());
        if self.mutations.contains_key(&self.primary) {
            keys.push(self.primary.clone());
        }
        keys.extend(
            self.mutations
                .keys()
                .filter(|k| **k != self.primary)
                .cloned(),
        );
        keys
    }

    fn secondary_keys(&self) -> Vec<Key> {
        self.mutations
            .keys()
            .filter(|k| **k != self.primary)
            .cloned()
            .collect()
    }
}
