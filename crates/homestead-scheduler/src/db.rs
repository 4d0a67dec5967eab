use rusqlite::Connection;

use crate::error::Result;

pub fn open(path: &str) -> Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    init_db(&conn)?;
    Ok(conn)
}

/// Initialise the `jobs` table. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS jobs (
            id                   TEXT    NOT NULL PRIMARY KEY,
            name                 TEXT    NOT NULL,
            description          TEXT    NOT NULL DEFAULT '',
            schedule_kind        TEXT    NOT NULL,
            schedule_expression  TEXT    NOT NULL,
            action_kind          TEXT    NOT NULL,
            action_config        TEXT    NOT NULL,
            enabled              INTEGER NOT NULL DEFAULT 1,
            last_run_at          TEXT,
            next_run_at          TEXT,
            run_count            INTEGER NOT NULL DEFAULT 0,
            created_at           TEXT    NOT NULL,
            tags                 TEXT    NOT NULL DEFAULT '[]',
            source               TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_next_run ON jobs(enabled, next_run_at);",
    )?;
    Ok(())
}
