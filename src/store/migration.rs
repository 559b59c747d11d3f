//! SQLite database migrations.

use rusqlite::Connection;
use tracing::info;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM migrations")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.filter_map(|r| r.ok()).collect()
    };

    let mut applied_count = 0;

    if !applied.contains(&"001_create_fifos".to_string()) {
        conn.execute_batch(
            "CREATE TABLE fifos (
                uuid TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                wait_timeout INTEGER NOT NULL,
                accept_timeout INTEGER NOT NULL,
                done_timeout INTEGER NOT NULL,
                unused_destroy_timeout INTEGER NOT NULL,
                allow_overrides INTEGER NOT NULL DEFAULT 0
            );

            INSERT INTO migrations (name, applied_at) VALUES ('001_create_fifos', strftime('%s', 'now'));
            ",
        )?;
        applied_count += 1;
    }

    if !applied.contains(&"002_create_tickets".to_string()) {
        conn.execute_batch(
            "CREATE TABLE tickets (
                uuid TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                notified_at INTEGER,
                accepted_at INTEGER,
                wait_timeout INTEGER NOT NULL,
                accept_timeout INTEGER NOT NULL,
                done_timeout INTEGER NOT NULL,
                fifo_uuid TEXT NOT NULL REFERENCES fifos(uuid) ON DELETE CASCADE
            );

            CREATE INDEX idx_tickets_fifo_created ON tickets(fifo_uuid, created_at);

            INSERT INTO migrations (name, applied_at) VALUES ('002_create_tickets', strftime('%s', 'now'));
            ",
        )?;
        applied_count += 1;
    }

    if applied_count > 0 {
        info!(count = applied_count, "applied database migrations");
    }

    Ok(())
}
