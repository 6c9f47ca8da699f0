// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Retry pacing for transient cluster errors.
//!
//! A [`Backoff`] is one exponential/jittered delay generator bound to one
//! error category. A [`Backoffer`] owns all `Backoff` instances of one
//! transaction attempt, accumulates the total sleep, and converts budget
//! exhaustion into a fatal [`Error::BackoffExhausted`].

use std::collections::HashMap;
use std::fmt;

use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tokio::time::sleep;
use tokio::time::Duration;

use crate::Error;
use crate::Result;

/// Total sleep budget for point reads, in milliseconds.
pub const GET_MAX_BACKOFF_MS: u64 = 20_000;
/// Total sleep budget for scans, in milliseconds.
pub const SCAN_MAX_BACKOFF_MS: u64 = 20_000;
/// Total sleep budget for prewrite, in milliseconds.
pub const PREWRITE_MAX_BACKOFF_MS: u64 = 20_000;
/// Total sleep budget for commit, in milliseconds.
///
/// Materially larger than the others: abandoning a commit after the primary
/// lock is written leaves a dangling decision that later readers must still
/// resolve.
pub const COMMIT_MAX_BACKOFF_MS: u64 = 41_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    NoJitter,
    FullJitter,
    EqualJitter,
    /// Derives the next delay from the previous one rather than the attempt
    /// count, decorrelating retries across clients.
    DecorrJitter,
}

/// The error categories retries are paced under.
///
/// Each category carries its own base/cap/jitter policy: lock contention is
/// paced differently from RPC transport failures or an overloaded server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackoffKind {
    /// Storage node RPC failure or timeout.
    TikvRpc,
    /// Conflict with another transaction's lock during a write.
    TxnLock,
    /// Conflict with another transaction's lock during a read.
    TxnLockFast,
    /// Timestamp/placement authority RPC failure.
    PdRpc,
    /// The key's region moved or split.
    RegionMiss,
    /// The region's leader moved.
    UpdateLeader,
    /// The storage node reports it is overloaded.
    ServerBusy,
}

impl BackoffKind {
    const fn policy(self) -> (u64, u64, Jitter) {
        match self {
            BackoffKind::TikvRpc => (100, 2_000, Jitter::EqualJitter),
            BackoffKind::TxnLock => (200, 3_000, Jitter::EqualJitter),
            BackoffKind::TxnLockFast => (100, 3_000, Jitter::EqualJitter),
            BackoffKind::PdRpc => (500, 3_000, Jitter::EqualJitter),
            BackoffKind::RegionMiss => (100, 500, Jitter::NoJitter),
            BackoffKind::UpdateLeader => (5_000, 5_000, Jitter::NoJitter),
            BackoffKind::ServerBusy => (2_000, 10_000, Jitter::EqualJitter),
        }
    }

    fn backoff(self) -> Backoff {
        let (base_ms, cap_ms, jitter) = self.policy();
        Backoff::new(base_ms, cap_ms, jitter)
    }
}

impl fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackoffKind::TikvRpc => "tikvRPC",
            BackoffKind::TxnLock => "txnLock",
            BackoffKind::TxnLockFast => "txnLockFast",
            BackoffKind::PdRpc => "pdRPC",
            BackoffKind::RegionMiss => "regionMiss",
            BackoffKind::UpdateLeader => "updateLeader",
            BackoffKind::ServerBusy => "serverBusy",
        };
        f.write_str(s)
    }
}

fn expo(base_ms: u64, cap_ms: u64, attempts: u32) -> u64 {
    let mul = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
    base_ms.saturating_mul(mul).min(cap_ms)
}

/// One exponential/jittered delay generator.
///
/// Never shared across error categories, and unbounded in attempt count;
/// bounding total retry time is the [`Backoffer`]'s job.
#[derive(Debug)]
pub struct Backoff {
    base_ms: u64,
    cap_ms: u64,
    jitter: Jitter,
    attempts: u32,
    last_sleep_ms: u64,
    rng: StdRng,
}

impl Backoff {
    pub fn new(base_ms: u64, cap_ms: u64, jitter: Jitter) -> Self {
        Self::with_rng(base_ms, cap_ms, jitter, StdRng::from_entropy())
    }

    /// A backoff with a seeded generator, for reproducible jitter.
    pub fn new_seeded(base_ms: u64, cap_ms: u64, jitter: Jitter, seed: u64) -> Self {
        Self::with_rng(base_ms, cap_ms, jitter, StdRng::seed_from_u64(seed))
    }

    fn with_rng(base_ms: u64, cap_ms: u64, jitter: Jitter, rng: StdRng) -> Self {
        // Keep the jitter helpers' ranges non-empty.
        let base_ms = base_ms.max(2);
        let cap_ms = cap_ms.max(base_ms);
        Self {
            base_ms,
            cap_ms,
            jitter,
            attempts: 0,
            last_sleep_ms: base_ms,
            rng,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_sleep_ms(&self) -> u64 {
        self.last_sleep_ms
    }

    /// Compute the next delay and advance the attempt counters.
    ///
    /// Split out from [`sleep`](Backoff::sleep) so the pacing schedule is
    /// testable without waiting it out.
    pub fn next_delay_ms(&mut self) -> u64 {
        let delay_ms = match self.jitter {
            Jitter::NoJitter => expo(self.base_ms, self.cap_ms, self.attempts),
            Jitter::FullJitter => {
                let v = expo(self.base_ms, self.cap_ms, self.attempts);
                self.rng.gen_range(0..v)
            }
            Jitter::EqualJitter => {
                let v = expo(self.base_ms, self.cap_ms, self.attempts);
                let half = v / 2;
                half + self.rng.gen_range(0..half.max(1))
            }
            Jitter::DecorrJitter => {
                let span = self
                    .last_sleep_ms
                    .saturating_mul(3)
                    .saturating_sub(self.base_ms)
                    .max(1);
                let v = self.base_ms + self.rng.gen_range(0..span);
                v.min(self.cap_ms)
            }
        };

        self.attempts += 1;
        self.last_sleep_ms = delay_ms;
        delay_ms
    }

    /// Suspend the caller for the next computed delay and return it.
    pub async fn sleep(&mut self) -> u64 {
        let delay_ms = self.next_delay_ms();
        sleep(Duration::from_millis(delay_ms)).await;
        delay_ms
    }
}

/// The retry budget of one transaction attempt.
///
/// Exclusively owned by that attempt; per-category [`Backoff`] state grows
/// lazily as new categories are encountered. Once `total_sleep_ms` crosses
/// `max_sleep_ms` every further call fails without sleeping.
#[derive(Debug)]
pub struct Backoffer {
    max_sleep_ms: u64,
    total_sleep_ms: u64,
    backoffs: HashMap<BackoffKind, Backoff>,
}

impl Backoffer {
    pub fn new(max_sleep_ms: u64) -> Self {
        Self {
            max_sleep_ms,
            total_sleep_ms: 0,
            backoffs: HashMap::new(),
        }
    }

    pub fn total_sleep_ms(&self) -> u64 {
        self.total_sleep_ms
    }

    pub fn max_sleep_ms(&self) -> u64 {
        self.max_sleep_ms
    }

    /// Sleep under the given category's policy, then return `Ok` to signal
    /// "retry now".
    ///
    /// When the cumulative sleep exceeds the budget the triggering error is
    /// wrapped in [`Error::BackoffExhausted`], which is terminal for the
    /// attempt.
    pub async fn backoff(&mut self, kind: BackoffKind, err: Error) -> Result<()> {
        if self.total_sleep_ms > self.max_sleep_ms {
            return Err(Error::BackoffExhausted {
                total_sleep_ms: self.total_sleep_ms,
                cause: Box::new(err),
            });
        }

        let backoff = self
            .backoffs
            .entry(kind)
            .or_insert_with(|| kind.backoff());
        let slept_ms = backoff.sleep().await;
        self.total_sleep_ms += slept_ms;

        debug!(
            "backoff {kind} slept {slept_ms}ms ({}/{}ms): {err}",
            self.total_sleep_ms, self.max_sleep_ms
        );

        if self.total_sleep_ms > self.max_sleep_ms {
            return Err(Error::BackoffExhausted {
                total_sleep_ms: self.total_sleep_ms,
                cause: Box::new(err),
            });
        }
        Ok(())
    }
}
