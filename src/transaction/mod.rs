// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! The transactional API: two-phase commit, snapshot reads, and the buffered
//! read-write transaction built from both.

mod committer;
mod lock;
mod snapshot;
mod transaction;

pub use committer::PrewriteResult;
pub use committer::TwoPhaseCommitter;
pub use snapshot::Snapshot;
pub use transaction::Transaction;
