//! Clock abstraction for the queue engine.
//!
//! All time reasoning in the engine goes through [`Clock`]: `now()` for wall
//! timestamps persisted to the store, `sleep()` for stage timers, wait
//! deadlines and the reaper tick. Production uses [`SystemClock`]; tests use
//! [`TestClock`], which supports virtual time advancement and reports pending
//! sleepers.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Boxed sleep future returned by [`Clock::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Resolve after `duration` has elapsed. A zero duration resolves
    /// immediately.
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Real time: `Utc::now` plus the tokio timer wheel.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

struct Sleeper {
    deadline: DateTime<Utc>,
    tx: oneshot::Sender<()>,
}

struct TestClockInner {
    now: DateTime<Utc>,
    sleepers: Vec<Sleeper>,
}

/// Manually advanced clock for tests.
///
/// `sleep` registers the caller synchronously, so a sleeper is visible to
/// [`TestClock::has_sleepers`] as soon as the future exists. [`advance`]
/// moves virtual time forward and releases every sleeper whose deadline has
/// been reached, in deadline order.
///
/// [`advance`]: TestClock::advance
pub struct TestClock {
    inner: Mutex<TestClockInner>,
}

impl TestClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(TestClockInner {
                now,
                sleepers: Vec::new(),
            }),
        }
    }

    /// Advance virtual time, firing due sleepers.
    pub fn advance(&self, duration: Duration) {
        let due = {
            let mut inner = self.inner.lock();
            let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
            inner.now = inner
                .now
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            let now = inner.now;

            let mut due: Vec<Sleeper> = Vec::new();
            let mut remaining = Vec::new();
            for sleeper in inner.sleepers.drain(..) {
                if sleeper.deadline <= now {
                    due.push(sleeper);
                } else {
                    remaining.push(sleeper);
                }
            }
            inner.sleepers = remaining;
            due.sort_by_key(|s| s.deadline);
            due
        };

        for sleeper in due {
            let _ = sleeper.tx.send(());
        }
    }

    /// True if any sleep future is registered and not yet due.
    pub fn has_sleepers(&self) -> bool {
        self.sleeper_count() > 0
    }

    pub fn sleeper_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.sleepers.retain(|s| !s.tx.is_closed());
        inner.sleepers.len()
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().now
    }

    fn sleep(&self, duration: Duration) -> SleepFuture {
        if duration.is_zero() {
            return Box::pin(std::future::ready(()));
        }
        let rx = {
            let mut inner = self.inner.lock();
            let (tx, rx) = oneshot::channel();
            let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
            let deadline = inner
                .now
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            inner.sleepers.push(Sleeper { deadline, tx });
            rx
        };
        // The sender is dropped without firing only if the clock itself is
        // dropped first; treat that as an elapsed timer.
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}
