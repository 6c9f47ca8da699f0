// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! A test-only in-memory cluster: an MVCC store with Percolator lock
//! semantics plus a monotonic local timestamp oracle, behind the same
//! [`Cluster`] trait the real transport would implement.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Duration;
use tokio::time::Instant;

use crate::backoff::BackoffKind;
use crate::cluster::Cluster;
use crate::cluster::Lock;
use crate::cluster::LockRecord;
use crate::cluster::TxnStatus;
use crate::Error;
use crate::Key;
use crate::KvPair;
use crate::Result;
use crate::Value;

/// The operations faults can be injected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MockOp {
    AllocateTimestamp,
    Prewrite,
    Commit,
    EraseLock,
    Read,
    BatchRead,
    CheckTxnStatus,
}

#[derive(Debug)]
struct MockLock {
    primary: Key,
    ts: u64,
    /// `None` is a tombstone.
    value: Option<Value>,
    ttl_ms: u64,
    written_at: Instant,
}

impl MockLock {
    fn meta(&self, key: &Key) -> Lock {
        Lock {
            key: key.clone(),
            primary: self.primary.clone(),
            ts: self.ts,
            ttl_ms: self.ttl_ms,
        }
    }

    fn is_expired(&self) -> bool {
        self.written_at.elapsed() >= Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone)]
struct WriteRecord {
    commit_ts: u64,
    start_ts: u64,
    /// `None` is a committed delete.
    value: Option<Value>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Per-key committed versions, ordered by `commit_ts` ascending.
    writes: HashMap<Key, Vec<WriteRecord>>,
    locks: HashMap<Key, MockLock>,
    /// Rollback markers: a marker at `(key, start_ts)` blocks a late
    /// prewrite or commit of that transaction at that key.
    rollbacks: HashSet<(Key, u64)>,
}

impl Inner {
    fn visible(&self, key: &Key, ts: u64) -> Result<Option<Value>> {
        if let Some(lock) = self.locks.get(key) {
            if lock.ts <= ts {
                return Err(Error::KeyIsLocked(lock.meta(key)));
            }
        }
        let value = self
            .writes
            .get(key)
            .and_then(|versions| versions.iter().rev().find(|w| w.commit_ts <= ts))
            .and_then(|w| w.value.clone());
        Ok(value)
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockCluster {
    ts: AtomicU64,
    inner: Mutex<Inner>,
    faults: Mutex<HashMap<MockOp, VecDeque<BackoffKind>>>,
}

impl MockCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Script the next `times` calls of `op` to fail with a transient error
    /// retryable under `kind`.
    pub(crate) fn inject_transient(&self, op: MockOp, kind: BackoffKind, times: usize) {
        let mut faults = self.faults.lock().unwrap();
        let queue = faults.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(kind);
        }
    }

    fn take_fault(&self, op: MockOp) -> Result<()> {
        let mut faults = self.faults.lock().unwrap();
        if let Some(kind) = faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(Error::Retryable {
                kind,
                message: format!("injected fault on {op:?}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Cluster for MockCluster {
    async fn allocate_timestamp(&self) -> Result<u64> {
        self.take_fault(MockOp::AllocateTimestamp)?;
        Ok(self.ts.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn prewrite(&self, record: LockRecord) -> Result<()> {
        self.take_fault(MockOp::Prewrite)?;
        let mut inner = self.inner.lock().unwrap();
        let key = record.mutation.key.clone();

        if inner.rollbacks.contains(&(key.clone(), record.ts)) {
            return Err(Error::TxnNotFound {
                start_ts: record.ts,
            });
        }
        if let Some(lock) = inner.locks.get(&key) {
            if lock.ts == record.ts {
                return Ok(());
            }
            return Err(Error::KeyIsLocked(lock.meta(&key)));
        }

        let value = if record.mutation.is_delete() {
            None
        } else {
            Some(record.mutation.value)
        };
        inner.locks.insert(
            key,
            MockLock {
                primary: record.primary,
                ts: record.ts,
                value,
                ttl_ms: record.ttl_ms,
                written_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn commit(&self, key: &Key, start_ts: u64, commit_ts: u64) -> Result<()> {
        self.take_fault(MockOp::Commit)?;
        let mut inner = self.inner.lock().unwrap();

        if inner.locks.get(key).is_some_and(|lock| lock.ts == start_ts) {
            let lock = inner.locks.remove(key).expect("lock checked above");
            let versions = inner.writes.entry(key.clone()).or_default();
            let pos = versions.partition_point(|w| w.commit_ts <= commit_ts);
            versions.insert(
                pos,
                WriteRecord {
                    commit_ts,
                    start_ts,
                    value: lock.value,
                },
            );
            return Ok(());
        }

        // No matching lock: committed already, or rolled back.
        let already_committed = inner
            .writes
            .get(key)
            .is_some_and(|versions| versions.iter().any(|w| w.start_ts == start_ts));
        if already_committed {
            return Ok(());
        }
        Err(Error::TxnNotFound { start_ts })
    }

    async fn erase_lock(&self, key: &Key, start_ts: u64) -> Result<()> {
        self.take_fault(MockOp::EraseLock)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.locks.get(key).is_some_and(|lock| lock.ts == start_ts) {
            inner.locks.remove(key);
        }
        inner.rollbacks.insert((key.clone(), start_ts));
        Ok(())
    }

    async fn read(&self, key: &Key, ts: u64) -> Result<Option<Value>> {
        self.take_fault(MockOp::Read)?;
        self.inner.lock().unwrap().visible(key, ts)
    }

    async fn batch_read(&self, keys: &[Key], ts: u64) -> Result<Vec<KvPair>> {
        self.take_fault(MockOp::BatchRead)?;
        let inner = self.inner.lock().unwrap();
        let mut pairs = Vec::new();
        for key in keys {
            if let Some(value) = inner.visible(key, ts)? {
                pairs.push(KvPair::new(key.clone(), value));
            }
        }
        Ok(pairs)
    }

    async fn check_txn_status(&self, primary: &Key, start_ts: u64) -> Result<TxnStatus> {
        self.take_fault(MockOp::CheckTxnStatus)?;
        let mut inner = self.inner.lock().unwrap();

        let committed = inner
            .writes
            .get(primary)
            .and_then(|versions| versions.iter().find(|w| w.start_ts == start_ts))
            .map(|w| w.commit_ts);
        if let Some(commit_ts) = committed {
            return Ok(TxnStatus::Committed(commit_ts));
        }

        if let Some(lock) = inner.locks.get(primary) {
            if lock.ts == start_ts {
                if !lock.is_expired() {
                    return Ok(TxnStatus::Locked);
                }
                inner.locks.remove(primary);
                inner.rollbacks.insert((primary.clone(), start_ts));
                return Ok(TxnStatus::RolledBack);
            }
        }

        // Neither a lock nor a commit record: treat the transaction as rolled
        // back and leave a marker so a late prewrite of the primary fails.
        inner.rollbacks.insert((primary.clone(), start_ts));
        Ok(TxnStatus::RolledBack)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Mutation;

    fn record(key: &str, value: &str, ts: u64) -> LockRecord {
        LockRecord::new(Mutation::new(key.into(), value.into()), key.into(), ts, 3_000)
    }

    #[tokio::test(start_paused = true)]
    async fn mvcc_versions_are_visible_by_timestamp() {
        let cluster = MockCluster::new();
        let key = Key::from("k");

        cluster.prewrite(record("k", "v1", 10)).await.unwrap();
        cluster.commit(&key, 10, 11).await.unwrap();
        cluster.prewrite(record("k", "v2", 20)).await.unwrap();
        cluster.commit(&key, 20, 21).await.unwrap();

        assert_eq!(cluster.read(&key, 10).await.unwrap(), None);
        assert_eq!(cluster.read(&key, 11).await.unwrap(), Some("v1".into()));
        assert_eq!(cluster.read(&key, 20).await.unwrap(), Some("v1".into()));
        assert_eq!(cluster.read(&key, 21).await.unwrap(), Some("v2".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn live_lock_blocks_reads_at_or_after_its_start_ts() {
        let cluster = MockCluster::new();
        let key = Key::from("k");
        cluster.prewrite(record("k", "v", 10)).await.unwrap();

        // Reads below the lock's start_ts pass; at or above, they conflict.
        assert_eq!(cluster.read(&key, 9).await.unwrap(), None);
        let err = cluster.read(&key, 10).await.unwrap_err();
        match err {
            Error::KeyIsLocked(lock) => {
                assert_eq!(lock.ts, 10);
                assert_eq!(lock.primary, key);
            }
            other => panic!("expected KeyIsLocked, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn erase_lock_is_idempotent_and_blocks_late_prewrite() {
        let cluster = MockCluster::new();
        let key = Key::from("k");

        cluster.erase_lock(&key, 10).await.unwrap();
        cluster.erase_lock(&key, 10).await.unwrap();

        let err = cluster.prewrite(record("k", "v", 10)).await.unwrap_err();
        assert!(matches!(err, Error::TxnNotFound { start_ts: 10 }));

        // A different transaction is unaffected.
        cluster.prewrite(record("k", "v", 20)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn check_txn_status_rolls_back_expired_primaries() {
        let cluster = MockCluster::new();
        let key = Key::from("k");
        let mut rec = record("k", "v", 10);
        rec.ttl_ms = 50;
        cluster.prewrite(rec).await.unwrap();

        assert_eq!(
            cluster.check_txn_status(&key, 10).await.unwrap(),
            TxnStatus::Locked
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            cluster.check_txn_status(&key, 10).await.unwrap(),
            TxnStatus::RolledBack
        );
        // The lock is gone and the commit must fail.
        let err = cluster.commit(&key, 10, 20).await.unwrap_err();
        assert!(matches!(err, Error::TxnNotFound { start_ts: 10 }));
    }

    #[tokio::test(start_paused = true)]
    async fn allocated_timestamps_are_strictly_increasing() {
        let cluster = MockCluster::new();
        let mut last = 0;
        for _ in 0..100 {
            let ts = cluster.allocate_timestamp().await.unwrap();
            assert!(ts > last);
            last = ts;
        }
    }
}
