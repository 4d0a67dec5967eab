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

/// Initialise the `tasks` and `blockers` tables. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id            TEXT    NOT NULL PRIMARY KEY,
            title         TEXT    NOT NULL,
            description   TEXT    NOT NULL DEFAULT '',
            status        TEXT    NOT NULL DEFAULT 'pending',
            priority      TEXT    NOT NULL DEFAULT 'normal',
            assignee      TEXT,
            dependent_ids TEXT    NOT NULL DEFAULT '[]',
            tags          TEXT    NOT NULL DEFAULT '[]',
            notes         TEXT    NOT NULL DEFAULT '',
            source        TEXT,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL,
            completed_at  TEXT
        ) STRICT;

        CREATE TABLE IF NOT EXISTS blockers (
            id           TEXT    NOT NULL PRIMARY KEY,
            task_id      TEXT    NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            kind         TEXT    NOT NULL,
            description  TEXT    NOT NULL DEFAULT '',
            created_at   TEXT    NOT NULL,
            resolved_at  TEXT,
            resolved_by  TEXT,
            resolution   TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
        CREATE INDEX IF NOT EXISTS idx_blockers_task ON blockers(task_id);",
    )?;
    Ok(())
}
