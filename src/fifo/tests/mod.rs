//! FIFO engine tests - modular organization.
//!
//! - queue: ordering, fairness, broadcast, basic flows
//! - timeouts: stage deadlines, eviction, reaper
//! - waiters: signal and registry semantics

use std::sync::Arc;
use std::time::Duration;

pub(crate) use crate::clock::{SystemClock, TestClock};
pub(crate) use crate::store::{SqliteConfig, SqliteStorage};

pub(crate) use super::{FifoConfig, FifoError, FifoManager, TicketOverrides};

mod queue;

pub(crate) fn setup() -> (Arc<FifoManager>, Arc<TestClock>) {
    setup_with_pull_rate(Duration::from_secs(5 * 60))
}

pub(crate) fn setup_with_pull_rate(pull_rate: Duration) -> (Arc<FifoManager>, Arc<TestClock>) {
    let clock = Arc::new(TestClock::new());
    let storage = SqliteStorage::in_memory().unwrap();
    storage.migrate().unwrap();
    let mgr = FifoManager::with_pull_rate(storage, clock.clone(), pull_rate);
    (mgr, clock)
}

pub(crate) fn system_setup() -> Arc<FifoManager> {
    let storage = SqliteStorage::in_memory().unwrap();
    storage.migrate().unwrap();
    FifoManager::new(storage, Arc::new(SystemClock))
}

/// Let spawned tasks run for a moment of real time.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Advance virtual time, then let the released tasks run.
pub(crate) async fn advance(clock: &TestClock, d: Duration) {
    clock.advance(d);
    settle().await;
}

/// Poll `cond` for up to a second of real time.
pub(crate) async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}
