//! fifoq - FIFO coordination service.
//!
//! An HTTP service where clients create named first-in/first-out queues,
//! enqueue themselves as tickets, long-poll until their ticket reaches the
//! head of the queue, and signal completion. Queue state is persisted in
//! SQLite; wait channels are in-memory and do not survive a restart.

pub mod clock;
pub mod duration;
pub mod fifo;
pub mod http;
pub mod store;
pub mod telemetry;
