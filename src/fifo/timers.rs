//! Single-flight stage timers.
//!
//! Each ticket has at most one pending timer, keyed by ticket id. Arming is
//! idempotent, so the many `update_ticket_queue` calls that happen while a
//! head is notified-but-unaccepted do not spawn a storm of redundant
//! timers. When a timer fires it re-loads the ticket and either drives the
//! queue (stale), re-arms for the ticket's current stage deadline (the
//! stage changed while the timer was pending), or drops silently (ticket
//! gone).

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::store::TicketRecord;

use super::FifoManager;

#[derive(Default)]
pub(crate) struct TimerSet {
    armed: Mutex<HashSet<Uuid>>,
}

impl TimerSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `id`; false if a timer is already pending for it.
    fn try_arm(&self, id: Uuid) -> bool {
        self.armed.lock().insert(id)
    }

    pub(crate) fn disarm(&self, id: Uuid) {
        self.armed.lock().remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn armed_count(&self) -> usize {
        self.armed.lock().len()
    }
}

impl FifoManager {
    /// Arm a one-shot timer for the ticket's current stage deadline, if the
    /// stage has one and no timer is pending yet.
    pub(crate) fn arm_for(&self, ticket: &TicketRecord) {
        let Some(deadline) = ticket.stage_deadline() else {
            return;
        };
        if !self.timers.try_arm(ticket.uuid) {
            return;
        }

        let fire_in = (deadline - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(ticket = %ticket.uuid, fire_in = %crate::duration::format(fire_in), "stage timer armed");

        // The sleep is created here, not inside the task, so the timer is
        // registered with the clock before this function returns. The task
        // holds only a weak handle: a pending timer never keeps a dropped
        // manager alive.
        let sleep = self.clock.sleep(fire_in);
        let me = self.me.clone();
        let ticket_uuid = ticket.uuid;
        let fifo_uuid = ticket.fifo_uuid;
        tokio::spawn(async move {
            sleep.await;
            let Some(mgr) = me.upgrade() else {
                return;
            };
            mgr.timers.disarm(ticket_uuid);
            mgr.handle_timer(ticket_uuid, fifo_uuid);
        });
    }

    fn handle_timer(&self, ticket: Uuid, fifo: Uuid) {
        let record = match self.store.ticket(ticket) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!(ticket = %ticket, error = %e, "timer re-evaluation failed");
                return;
            }
        };

        if record.is_stale(self.clock.now()) {
            // Progress is not lost on failure: the next wait/ticket/done
            // call re-enters update_ticket_queue.
            if let Err(e) = self.update_ticket_queue(fifo) {
                error!(fifo = %fifo, ticket = %ticket, error = %e, "queue update after timeout failed");
            }
        } else {
            self.arm_for(&record);
        }
    }
}
