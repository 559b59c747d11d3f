//! FIFO coordination engine.
//!
//! ## Module organization
//!
//! - `manager.rs` - [`FifoManager`] struct, constructors, the public
//!   operations (create fifo, create ticket, wait, done)
//! - `engine.rs` - queue-head advancement (`update_ticket_queue`)
//! - `waiters.rs` - one-shot broadcast signals keyed by ticket id
//! - `timers.rs` - single-flight stage timers
//! - `reaper.rs` - idle-fifo garbage collection

mod engine;
mod manager;
mod reaper;
mod timers;
pub mod waiters;

#[cfg(test)]
mod tests;

use thiserror::Error;
use uuid::Uuid;

pub use manager::{FifoConfig, FifoManager, TicketOverrides};

/// Errors surfaced by queue operations.
#[derive(Debug, Error)]
pub enum FifoError {
    #[error("fifo {0} not found")]
    FifoNotFound(Uuid),
    #[error("ticket {0} not found")]
    TicketNotFound(Uuid),
    #[error("ticket does not belong to this fifo")]
    FifoMismatch,
    #[error("wait deadline exceeded")]
    WaitTimeout,
    #[error("ticket evicted from the queue")]
    TicketGone,
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}
