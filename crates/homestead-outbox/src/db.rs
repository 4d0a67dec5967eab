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

/// Initialise the `outbox` table and its index. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS outbox (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id        INTEGER NOT NULL,
            agent_name     TEXT    NOT NULL,
            body           TEXT    NOT NULL,
            parse_mode     TEXT    NOT NULL DEFAULT 'html',
            created_at     TEXT    NOT NULL,
            sent_at        TEXT,
            status         TEXT    NOT NULL DEFAULT 'pending',
            failure_reason TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_outbox_pending
            ON outbox(status, created_at);",
    )?;
    Ok(())
}
