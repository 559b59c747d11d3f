//! Queue-head advancement.
//!
//! `update_ticket_queue` is the single serialization point: every state
//! change (ticket creation, wait, done, a stage timer firing) funnels
//! through it. One call evicts at most one stale head and notifies at most
//! one successor, so each invocation either leaves the queue quiescent or
//! arms exactly one timer whose expiry re-enters the function.

use tracing::{info, warn};
use uuid::Uuid;

use crate::store::records;
use crate::store::TicketRecord;

use super::{FifoError, FifoManager};

#[derive(Default)]
struct Advance {
    evicted: Option<Uuid>,
    head: Option<TicketRecord>,
}

impl FifoManager {
    /// Re-evaluate the head of `fifo`: touch the fifo, evict the head if it
    /// overran its accept or done deadline, notify the next ticket, and arm
    /// the head's stage timer.
    pub(crate) fn update_ticket_queue(&self, fifo: Uuid) -> Result<(), FifoError> {
        let now = self.clock.now();

        let advance = self.store.transaction(|tx| {
            if records::fifo(tx, fifo)?.is_none() {
                return Ok(None);
            }
            records::touch_fifo(tx, fifo, now)?;

            // Two rows: the head, plus a candidate to promote without a
            // second query if the head gets evicted.
            let mut tickets = records::oldest_tickets(tx, fifo, 2)?;
            if tickets.is_empty() {
                return Ok(Some(Advance::default()));
            }

            let mut advance = Advance::default();
            let mut head = tickets.remove(0);

            if head.is_stale(now) {
                records::delete_ticket(tx, head.uuid)?;
                advance.evicted = Some(head.uuid);
                match tickets.pop() {
                    Some(next) => head = next,
                    None => return Ok(Some(advance)),
                }
            }

            if head.notified_at.is_none() {
                records::set_notified(tx, head.uuid, now)?;
                head.notified_at = Some(now);
            }

            advance.head = Some(head);
            Ok(Some(advance))
        })?;

        let Some(advance) = advance else {
            return Err(FifoError::FifoNotFound(fifo));
        };

        // Signals fire only after the transaction committed, so a released
        // waiter always observes the advanced queue.
        if let Some(evicted) = advance.evicted {
            warn!(fifo = %fifo, ticket = %evicted, "evicted stale ticket");
            self.waiters.fire(evicted);
        }
        if let Some(head) = advance.head {
            self.arm_for(&head);
            if self.waiters.fire(head.uuid) {
                info!(fifo = %fifo, ticket = %head.uuid, "ticket owner notified");
            }
        }
        Ok(())
    }
}
