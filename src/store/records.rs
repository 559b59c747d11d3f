//! Row types and queries for the `fifos` and `tickets` tables.
//!
//! Durations are stored as 64-bit nanosecond integers, timestamps as 64-bit
//! nanosecond unix wall-clock values.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

/// A named queue with its timeout policy.
#[derive(Debug, Clone)]
pub struct FifoRecord {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub wait_timeout: Duration,
    pub accept_timeout: Duration,
    pub done_timeout: Duration,
    pub unused_destroy_timeout: Duration,
    pub allow_overrides: bool,
}

impl FifoRecord {
    /// Instant after which the fifo counts as idle and may be reaped.
    /// `None` when reaping is disabled for this fifo.
    pub fn idle_deadline(&self) -> Option<DateTime<Utc>> {
        if self.unused_destroy_timeout.is_zero() {
            return None;
        }
        Some(after(self.updated_at, self.unused_destroy_timeout))
    }
}

/// A positional claim in a fifo.
#[derive(Debug, Clone)]
pub struct TicketRecord {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub wait_timeout: Duration,
    pub accept_timeout: Duration,
    pub done_timeout: Duration,
    pub fifo_uuid: Uuid,
}

impl TicketRecord {
    /// True if the ticket has overrun its current stage deadline: notified
    /// but never waited on within `accept_timeout`, or accepted but not
    /// completed within `done_timeout`. Disabled (zero) durations never
    /// count as overrun.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match (self.notified_at, self.accepted_at) {
            (Some(notified), None) => {
                !self.accept_timeout.is_zero() && now > after(notified, self.accept_timeout)
            }
            (_, Some(accepted)) => {
                !self.done_timeout.is_zero() && now > after(accepted, self.done_timeout)
            }
            (None, None) => false,
        }
    }

    /// Deadline of the ticket's current stage, if one applies.
    pub fn stage_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.notified_at, self.accepted_at) {
            (Some(notified), None) if !self.accept_timeout.is_zero() => {
                Some(after(notified, self.accept_timeout))
            }
            (_, Some(accepted)) if !self.done_timeout.is_zero() => {
                Some(after(accepted, self.done_timeout))
            }
            _ => None,
        }
    }
}

/// Saturating `t + d` on the chrono timeline.
pub fn after(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| t.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn ts_to_db(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn ts_from_db(ns: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ns)
}

fn dur_to_db(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

fn dur_from_db(ns: i64) -> Duration {
    Duration::from_nanos(ns.max(0) as u64)
}

fn uuid_col(row: &Row<'_>, idx: usize) -> Result<Uuid, rusqlite::Error> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn fifo_from_row(row: &Row<'_>) -> Result<FifoRecord, rusqlite::Error> {
    Ok(FifoRecord {
        uuid: uuid_col(row, 0)?,
        created_at: ts_from_db(row.get(1)?),
        updated_at: ts_from_db(row.get(2)?),
        wait_timeout: dur_from_db(row.get(3)?),
        accept_timeout: dur_from_db(row.get(4)?),
        done_timeout: dur_from_db(row.get(5)?),
        unused_destroy_timeout: dur_from_db(row.get(6)?),
        allow_overrides: row.get(7)?,
    })
}

fn ticket_from_row(row: &Row<'_>) -> Result<TicketRecord, rusqlite::Error> {
    Ok(TicketRecord {
        uuid: uuid_col(row, 0)?,
        created_at: ts_from_db(row.get(1)?),
        notified_at: row.get::<_, Option<i64>>(2)?.map(ts_from_db),
        accepted_at: row.get::<_, Option<i64>>(3)?.map(ts_from_db),
        wait_timeout: dur_from_db(row.get(4)?),
        accept_timeout: dur_from_db(row.get(5)?),
        done_timeout: dur_from_db(row.get(6)?),
        fifo_uuid: uuid_col(row, 7)?,
    })
}

const FIFO_COLUMNS: &str = "uuid, created_at, updated_at, wait_timeout, accept_timeout, \
                            done_timeout, unused_destroy_timeout, allow_overrides";
const TICKET_COLUMNS: &str = "uuid, created_at, notified_at, accepted_at, wait_timeout, \
                              accept_timeout, done_timeout, fifo_uuid";

pub fn insert_fifo(conn: &Connection, fifo: &FifoRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO fifos (uuid, created_at, updated_at, wait_timeout, accept_timeout,
            done_timeout, unused_destroy_timeout, allow_overrides)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            fifo.uuid.to_string(),
            ts_to_db(fifo.created_at),
            ts_to_db(fifo.updated_at),
            dur_to_db(fifo.wait_timeout),
            dur_to_db(fifo.accept_timeout),
            dur_to_db(fifo.done_timeout),
            dur_to_db(fifo.unused_destroy_timeout),
            fifo.allow_overrides,
        ],
    )?;
    Ok(())
}

pub fn fifo(conn: &Connection, uuid: Uuid) -> Result<Option<FifoRecord>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {FIFO_COLUMNS} FROM fifos WHERE uuid = ?1"),
        params![uuid.to_string()],
        fifo_from_row,
    )
    .optional()
}

pub fn all_fifos(conn: &Connection) -> Result<Vec<FifoRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("SELECT {FIFO_COLUMNS} FROM fifos"))?;
    let rows = stmt.query_map([], fifo_from_row)?;
    rows.collect()
}

pub fn touch_fifo(
    conn: &Connection,
    uuid: Uuid,
    now: DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE fifos SET updated_at = ?1 WHERE uuid = ?2",
        params![ts_to_db(now), uuid.to_string()],
    )?;
    Ok(())
}

/// Delete a fifo; its tickets go with it via `ON DELETE CASCADE`.
pub fn delete_fifo(conn: &Connection, uuid: Uuid) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM fifos WHERE uuid = ?1", params![uuid.to_string()])?;
    Ok(())
}

pub fn insert_ticket(conn: &Connection, ticket: &TicketRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO tickets (uuid, created_at, notified_at, accepted_at, wait_timeout,
            accept_timeout, done_timeout, fifo_uuid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            ticket.uuid.to_string(),
            ts_to_db(ticket.created_at),
            ticket.notified_at.map(ts_to_db),
            ticket.accepted_at.map(ts_to_db),
            dur_to_db(ticket.wait_timeout),
            dur_to_db(ticket.accept_timeout),
            dur_to_db(ticket.done_timeout),
            ticket.fifo_uuid.to_string(),
        ],
    )?;
    Ok(())
}

pub fn ticket(conn: &Connection, uuid: Uuid) -> Result<Option<TicketRecord>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE uuid = ?1"),
        params![uuid.to_string()],
        ticket_from_row,
    )
    .optional()
}

/// Oldest tickets of a fifo, `created_at` ascending, ties broken by uuid.
pub fn oldest_tickets(
    conn: &Connection,
    fifo: Uuid,
    limit: usize,
) -> Result<Vec<TicketRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE fifo_uuid = ?1
         ORDER BY created_at ASC, uuid ASC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![fifo.to_string(), limit], ticket_from_row)?;
    rows.collect()
}

pub fn ticket_ids(conn: &Connection, fifo: Uuid) -> Result<Vec<Uuid>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT uuid FROM tickets WHERE fifo_uuid = ?1")?;
    let rows = stmt.query_map(params![fifo.to_string()], |row| uuid_col(row, 0))?;
    rows.collect()
}

pub fn set_notified(
    conn: &Connection,
    uuid: Uuid,
    at: DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE tickets SET notified_at = ?1 WHERE uuid = ?2",
        params![ts_to_db(at), uuid.to_string()],
    )?;
    Ok(())
}

/// Mark a ticket accepted iff it has not been accepted yet. Returns whether
/// this call won the race; the first writer wins and later writers see
/// `false`.
pub fn accept_ticket(
    conn: &Connection,
    uuid: Uuid,
    at: DateTime<Utc>,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE tickets SET accepted_at = ?1 WHERE uuid = ?2 AND accepted_at IS NULL",
        params![ts_to_db(at), uuid.to_string()],
    )?;
    Ok(changed > 0)
}

/// Delete a ticket. Returns whether a row existed.
pub fn delete_ticket(conn: &Connection, uuid: Uuid) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "DELETE FROM tickets WHERE uuid = ?1",
        params![uuid.to_string()],
    )?;
    Ok(changed > 0)
}
