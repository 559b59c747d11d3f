//! Core FifoManager struct, constructors, and public queue operations.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::store::{FifoRecord, SqliteConfig, SqliteStorage, TicketRecord};

use super::timers::TimerSet;
use super::waiters::{Signal, WaiterRegistry};
use super::FifoError;

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(6 * 3600);
const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_DONE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_UNUSED_DESTROY_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 3600);
const DEFAULT_PULL_RATE: Duration = Duration::from_secs(5 * 60);

/// Timeout policy for a new fifo. Zero disables the respective timeout.
#[derive(Debug, Clone, Copy)]
pub struct FifoConfig {
    pub wait_timeout: Duration,
    pub accept_timeout: Duration,
    pub done_timeout: Duration,
    pub unused_destroy_timeout: Duration,
    /// Whether tickets of this fifo may override the three stage timeouts
    /// at creation time.
    pub allow_overrides: bool,
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            done_timeout: DEFAULT_DONE_TIMEOUT,
            unused_destroy_timeout: DEFAULT_UNUSED_DESTROY_TIMEOUT,
            allow_overrides: false,
        }
    }
}

/// Per-ticket stage timeout overrides, honored only when the fifo allows
/// them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketOverrides {
    pub wait_timeout: Option<Duration>,
    pub accept_timeout: Option<Duration>,
    pub done_timeout: Option<Duration>,
}

/// The FIFO coordinator: durable queue state plus the in-memory waiter
/// registry and timer set.
pub struct FifoManager {
    pub(crate) store: SqliteStorage,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) waiters: WaiterRegistry,
    pub(crate) timers: TimerSet,
    pub(crate) pull_rate: Duration,
    /// Handle to ourselves for timer tasks. Weak, so pending timers never
    /// keep a dropped manager alive.
    pub(crate) me: Weak<FifoManager>,
}

impl FifoManager {
    pub fn new(store: SqliteStorage, clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::with_pull_rate(store, clock, DEFAULT_PULL_RATE)
    }

    pub fn with_pull_rate(
        store: SqliteStorage,
        clock: Arc<dyn Clock>,
        pull_rate: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            store,
            clock,
            waiters: WaiterRegistry::new(),
            timers: TimerSet::new(),
            pull_rate,
            me: me.clone(),
        })
    }

    /// Open (or create) the SQLite store at `config.path`, run migrations,
    /// and build a manager on the system clock.
    pub fn open(config: SqliteConfig) -> Result<Arc<Self>, rusqlite::Error> {
        Self::open_with_pull_rate(config, DEFAULT_PULL_RATE)
    }

    pub fn open_with_pull_rate(
        config: SqliteConfig,
        pull_rate: Duration,
    ) -> Result<Arc<Self>, rusqlite::Error> {
        let store = SqliteStorage::new(config)?;
        store.migrate()?;
        Ok(Self::with_pull_rate(store, Arc::new(SystemClock), pull_rate))
    }

    pub(crate) fn waiters(&self) -> &WaiterRegistry {
        &self.waiters
    }

    /// Create a new fifo with the given timeout policy.
    pub fn create_fifo(&self, config: FifoConfig) -> Result<Uuid, rusqlite::Error> {
        let now = self.clock.now();
        let record = FifoRecord {
            uuid: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            wait_timeout: config.wait_timeout,
            accept_timeout: config.accept_timeout,
            done_timeout: config.done_timeout,
            unused_destroy_timeout: config.unused_destroy_timeout,
            allow_overrides: config.allow_overrides,
        };
        self.store.insert_fifo(&record)?;
        info!(fifo = %record.uuid, "fifo created");
        Ok(record.uuid)
    }

    pub fn fifo(&self, uuid: Uuid) -> Result<Option<FifoRecord>, rusqlite::Error> {
        self.store.fifo(uuid)
    }

    pub fn ticket(&self, uuid: Uuid) -> Result<Option<TicketRecord>, rusqlite::Error> {
        self.store.ticket(uuid)
    }

    /// Enqueue a new ticket. Stage timeouts are inherited from the fifo;
    /// overrides apply only when the fifo was created with
    /// `allow_overrides` and are ignored otherwise.
    pub fn create_ticket(&self, fifo: Uuid, overrides: TicketOverrides) -> Result<Uuid, FifoError> {
        let record = self.store.fifo(fifo)?.ok_or(FifoError::FifoNotFound(fifo))?;

        let mut wait_timeout = record.wait_timeout;
        let mut accept_timeout = record.accept_timeout;
        let mut done_timeout = record.done_timeout;
        if record.allow_overrides {
            wait_timeout = overrides.wait_timeout.unwrap_or(wait_timeout);
            accept_timeout = overrides.accept_timeout.unwrap_or(accept_timeout);
            done_timeout = overrides.done_timeout.unwrap_or(done_timeout);
        }

        let ticket = TicketRecord {
            uuid: Uuid::new_v4(),
            created_at: self.clock.now(),
            notified_at: None,
            accepted_at: None,
            wait_timeout,
            accept_timeout,
            done_timeout,
            fifo_uuid: fifo,
        };
        self.store.insert_ticket(&ticket)?;
        info!(fifo = %fifo, ticket = %ticket.uuid, "ticket created");

        self.update_ticket_queue(fifo)?;
        Ok(ticket.uuid)
    }

    /// Block until the ticket is notified, then accept it.
    ///
    /// Returns once the ticket reaches the head of the queue and the accept
    /// transition has been recorded. Errors: `TicketNotFound` for unknown
    /// tickets, `FifoMismatch` when the ticket belongs to another fifo,
    /// `WaitTimeout` when the ticket's wait deadline elapses first (the
    /// ticket stays queued), `TicketGone` when the ticket was evicted while
    /// we were parked.
    pub async fn wait(&self, fifo: Uuid, ticket: Uuid) -> Result<(), FifoError> {
        let record = self
            .store
            .ticket(ticket)?
            .ok_or(FifoError::TicketNotFound(ticket))?;
        if record.fifo_uuid != fifo {
            return Err(FifoError::FifoMismatch);
        }

        let signal = self.waiters.get_or_create(ticket);
        let mut guard = WaitGuard {
            registry: &self.waiters,
            id: ticket,
            signal: Arc::clone(&signal),
            armed: true,
        };

        // Drive the queue; if the ticket already is the healthy head this
        // fires the signal we just obtained.
        self.update_ticket_queue(fifo)?;

        debug!(fifo = %fifo, ticket = %ticket, "waiting for ticket");
        if record.wait_timeout.is_zero() {
            signal.wait().await;
        } else {
            tokio::select! {
                biased;
                _ = signal.wait() => {}
                _ = self.clock.sleep(record.wait_timeout) => {
                    guard.disarm();
                    return Err(FifoError::WaitTimeout);
                }
            }
        }
        guard.disarm();

        // Woken. The signal also fires on eviction, so re-check before
        // accepting.
        let now = self.clock.now();
        let Some(record) = self.store.ticket(ticket)? else {
            return Err(FifoError::TicketGone);
        };
        if record.is_stale(now) {
            return Err(FifoError::TicketGone);
        }

        if self.store.accept_ticket(ticket, now)? {
            info!(fifo = %fifo, ticket = %ticket, "ticket accepted");
            // The pending timer, if any, watches the obsolete accept
            // deadline; replace it with one for the done stage.
            self.timers.disarm(ticket);
            let accepted = TicketRecord {
                accepted_at: Some(now),
                ..record
            };
            self.arm_for(&accepted);
        } else {
            debug!(fifo = %fifo, ticket = %ticket, "ticket already accepted");
        }
        Ok(())
    }

    /// Complete and delete a ticket, then advance the queue. The second
    /// `done` for the same ticket reports `TicketNotFound`.
    pub fn done(&self, fifo: Uuid, ticket: Uuid) -> Result<(), FifoError> {
        let record = self
            .store
            .ticket(ticket)?
            .ok_or(FifoError::TicketNotFound(ticket))?;
        if record.fifo_uuid != fifo {
            return Err(FifoError::FifoMismatch);
        }

        if !self.store.delete_ticket(ticket)? {
            return Err(FifoError::TicketNotFound(ticket));
        }
        self.waiters.fire(ticket);
        info!(fifo = %fifo, ticket = %ticket, "ticket done");

        self.update_ticket_queue(fifo)?;
        Ok(())
    }
}

/// Removes the registry entry when a waiter disconnects mid-wait, so an
/// abandoned long-poll does not leak its signal. Disarmed on every ordinary
/// exit path.
struct WaitGuard<'a> {
    registry: &'a WaiterRegistry,
    id: Uuid,
    signal: Arc<Signal>,
    armed: bool,
}

impl WaitGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.remove_matching(self.id, &self.signal);
        }
    }
}
