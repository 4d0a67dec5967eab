use rusqlite::Connection;

use crate::error::Result;

/// Open (creating if needed) the sessions SQLite file at `path` and
/// initialise its schema.
pub fn open(path: &str) -> Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    init_db(&conn)?;
    Ok(conn)
}

/// Initialise the `sessions` table and its indexes. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            chat_id               INTEGER NOT NULL,
            name                  TEXT    NOT NULL,
            user_id               TEXT    NOT NULL,
            backend_session_handle TEXT,
            model                 TEXT    NOT NULL,
            is_active             INTEGER NOT NULL DEFAULT 0,
            created_at            TEXT    NOT NULL,
            last_active_at        TEXT    NOT NULL,
            message_count         INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (chat_id, name)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_sessions_chat_active
            ON sessions(chat_id, is_active);",
    )?;
    Ok(())
}
