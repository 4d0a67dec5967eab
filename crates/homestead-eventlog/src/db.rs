use rusqlite::Connection;

use crate::error::Result;

/// Open (creating if needed) the event-log SQLite file at `path` and initialise
/// its schema. Sets WAL mode and a bounded busy timeout per the storage model.
pub fn open(path: &str) -> Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    init_db(&conn)?;
    Ok(conn)
}

/// Initialise the `log_records` table and its indexes. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS log_records (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp  TEXT NOT NULL,
            level      TEXT NOT NULL,
            source     TEXT NOT NULL,
            message    TEXT NOT NULL,
            payload    TEXT,
            session_id TEXT,
            chat_id    INTEGER
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_log_records_ts_level
            ON log_records(timestamp, level);
        CREATE INDEX IF NOT EXISTS idx_log_records_source
            ON log_records(source);",
    )?;
    Ok(())
}
