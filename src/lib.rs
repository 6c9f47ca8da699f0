// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! A client-side driver for a distributed, MVCC-based transactional
//! key-value store, in the style of Percolator.
//!
//! A transaction elects one **primary key** whose lock carries the
//! authoritative state; every other key's lock points back to it. Commit is
//! two-phase: prewrite provisional locks for all keys at a start timestamp,
//! then commit the primary at a later commit timestamp — the primary commit
//! is the single decision point for the whole transaction. Readers that run
//! into a stale lock resolve it by consulting the primary, so a committed
//! transaction is always visible and an uncommitted one never leaks.
//!
//! Clients may split the key set across cooperating committers (e.g. a
//! scheduler and several executors) that share one start timestamp, prewrite
//! disjoint key subsets, and let exactly one of them drive the commit:
//!
//! ```rust,no_run
//! # use txnkv::{Cluster, Snapshot, TwoPhaseCommitter, Result};
//! # async fn example(cluster: &impl Cluster) -> Result<()> {
//! let mut scheduler = TwoPhaseCommitter::new(cluster, "a", [("a", "a1"), ("b", "b1")]);
//! let token = scheduler.prewrite_keys(None).await?;
//!
//! let mut executor = TwoPhaseCommitter::new(cluster, "a", [("c", "c1")]);
//! executor.prewrite_keys(Some(token.start_ts)).await?;
//!
//! scheduler.commit_keys().await?;
//!
//! let snap = Snapshot::new(cluster, None).await?;
//! assert_eq!(snap.get("c").await?, Some("c1".into()));
//! # Ok(())
//! # }
//! ```
//!
//! For single-actor use, [`Transaction`] buffers writes and commits them
//! through one committer:
//!
//! ```rust,no_run
//! # use txnkv::{Cluster, Transaction, Result};
//! # async fn example(cluster: &impl Cluster) -> Result<()> {
//! let mut txn = Transaction::new(cluster);
//! txn.set("key", "value")?;
//! txn.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Every cluster-facing call retries transient failures (region movement,
//! server busy, lock contention, RPC failure) under the [`backoff`] engine:
//! one [`Backoffer`] per transaction attempt enforces a total sleep budget
//! and turns exhaustion into a fatal error. The transport itself is abstract:
//! callers provide a [`Cluster`] implementation and an external authority for
//! globally ordered timestamps.

pub mod backoff;
pub mod cluster;
pub mod transaction;

mod common;
mod kv;

#[cfg(test)]
mod mock;

#[doc(inline)]
pub use common::Error;
#[doc(inline)]
pub use common::Result;

#[doc(inline)]
pub use crate::backoff::Backoff;
#[doc(inline)]
pub use crate::backoff::BackoffKind;
#[doc(inline)]
pub use crate::backoff::Backoffer;
#[doc(inline)]
pub use crate::backoff::Jitter;
#[doc(inline)]
pub use crate::cluster::Cluster;
#[doc(inline)]
pub use crate::cluster::Lock;
#[doc(inline)]
pub use crate::cluster::LockRecord;
#[doc(inline)]
pub use crate::cluster::TxnStatus;
#[doc(inline)]
pub use crate::kv::Key;
#[doc(inline)]
pub use crate::kv::KvPair;
#[doc(inline)]
pub use crate::kv::Mutation;
#[doc(inline)]
pub use crate::kv::Value;
#[doc(inline)]
pub use crate::transaction::PrewriteResult;
#[doc(inline)]
pub use crate::transaction::Snapshot;
#[doc(inline)]
pub use crate::transaction::Transaction;
#[doc(inline)]
pub use crate::transaction::TwoPhaseCommitter;
