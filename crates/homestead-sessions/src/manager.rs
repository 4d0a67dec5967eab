use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::{Result, SessionError};
use crate::types::Session;

/// Thread-safe manager for persisted, per-chat conversation sessions.
///
/// Wraps a single SQLite connection in a `Mutex`; a Mutex is sufficient at
/// the write rate this store sees.
pub struct SessionManager {
    db: Mutex<Connection>,
}

impl SessionManager {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(crate::db::open(path)?))
    }

    /// The currently active session for a chat, if any.
    #[instrument(skip(self))]
    pub fn get_active(&self, chat_id: i64) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT chat_id, name, user_id, backend_session_handle, model,
                    is_active, created_at, last_active_at, message_count
             FROM sessions WHERE chat_id = ?1 AND is_active = 1",
            params![chat_id],
            row_to_session,
        )
        .optional()
        .map_err(SessionError::from)
    }

    /// Fetch a specific session by its `(chat_id, name)` key.
    #[instrument(skip(self))]
    pub fn get(&self, chat_id: i64, name: &str) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT chat_id, name, user_id, backend_session_handle, model,
                    is_active, created_at, last_active_at, message_count
             FROM sessions WHERE chat_id = ?1 AND name = ?2",
            params![chat_id, name],
            row_to_session,
        )
        .optional()
        .map_err(SessionError::from)
    }

    /// Create a new, inactive session row.
    #[instrument(skip(self))]
    pub fn create(&self, chat_id: i64, name: &str, model: &str, user_id: &str) -> Result<Session> {
        let now = Utc::now();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sessions
             (chat_id, name, user_id, backend_session_handle, model, is_active, created_at, last_active_at, message_count)
             VALUES (?1, ?2, ?3, NULL, ?4, 0, ?5, ?5, 0)",
            params![chat_id, name, user_id, model, now.to_rfc3339()],
        )?;
        Ok(Session {
            chat_id,
            name: name.to_string(),
            user_id: user_id.to_string(),
            backend_session_handle: None,
            model: model.to_string(),
            is_active: false,
            created_at: now,
            last_active_at: now,
            message_count: 0,
        })
    }

    /// Atomically deactivate any currently-active session for `chat_id` and
    /// activate `name` — the store's one concurrency invariant: at most one
    /// active session per chat.
    #[instrument(skip(self))]
    pub fn activate(&self, chat_id: i64, name: &str) -> Result<Session> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "UPDATE sessions SET is_active = 0 WHERE chat_id = ?1 AND is_active = 1",
            params![chat_id],
        )?;
        let rows = tx.execute(
            "UPDATE sessions SET is_active = 1 WHERE chat_id = ?1 AND name = ?2",
            params![chat_id, name],
        )?;
        if rows == 0 {
            return Err(SessionError::NotFound {
                chat_id,
                name: name.to_string(),
            });
        }
        let session = tx.query_row(
            "SELECT chat_id, name, user_id, backend_session_handle, model,
                    is_active, created_at, last_active_at, message_count
             FROM sessions WHERE chat_id = ?1 AND name = ?2",
            params![chat_id, name],
            row_to_session,
        )?;
        tx.commit()?;
        Ok(session)
    }

    /// Change the model tag bound to a session. Validation against the
    /// enumerated allow-list happens at the API boundary, not here.
    #[instrument(skip(self))]
    pub fn set_model(&self, chat_id: i64, name: &str, model: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE sessions SET model = ?1 WHERE chat_id = ?2 AND name = ?3",
            params![model, chat_id, name],
        )?;
        if rows == 0 {
            return Err(SessionError::NotFound {
                chat_id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Record a successful turn: bump `message_count`, persist the new
    /// backend handle, and advance `last_active_at`. Called only after a
    /// turn's terminal success — the dispatcher never mutates SS on failure.
    #[instrument(skip(self, new_handle))]
    pub fn touch(&self, chat_id: i64, name: &str, new_handle: Option<&str>) -> Result<()> {
        let now = Utc::now();
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE sessions
             SET message_count = message_count + 1,
                 backend_session_handle = COALESCE(?1, backend_session_handle),
                 last_active_at = ?2
             WHERE chat_id = ?3 AND name = ?4",
            params![new_handle, now.to_rfc3339(), chat_id, name],
        )?;
        if rows == 0 {
            return Err(SessionError::NotFound {
                chat_id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Permanently delete a session row.
    #[instrument(skip(self))]
    pub fn delete(&self, chat_id: i64, name: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "DELETE FROM sessions WHERE chat_id = ?1 AND name = ?2",
            params![chat_id, name],
        )?;
        if rows == 0 {
            return Err(SessionError::NotFound {
                chat_id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// List all sessions for a chat, most recently active first.
    #[instrument(skip(self))]
    pub fn list(&self, chat_id: i64) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT chat_id, name, user_id, backend_session_handle, model,
                    is_active, created_at, last_active_at, message_count
             FROM sessions WHERE chat_id = ?1 ORDER BY last_active_at DESC",
        )?;
        let rows = stmt
            .query_map(params![chat_id], row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Pick the next rotation name for `base` (e.g. `"default"`) under a
    /// chat: the current UTC date as `base-YYYYMMDD`, falling back to an
    /// incrementing numeric suffix if that name is already taken (more than
    /// one rotation in a day).
    #[instrument(skip(self))]
    pub fn next_rotation_name(&self, chat_id: i64, base: &str) -> Result<String> {
        let date_suffix = Utc::now().format("%Y%m%d").to_string();
        let dated = format!("{base}-{date_suffix}");
        if self.get(chat_id, &dated)?.is_none() {
            return Ok(dated);
        }
        let mut n = 2;
        loop {
            let candidate = format!("{dated}-{n}");
            if self.get(chat_id, &candidate)?.is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let created_at: String = row.get(6)?;
    let last_active_at: String = row.get(7)?;
    Ok(Session {
        chat_id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        backend_session_handle: row.get(3)?,
        model: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_active_at: chrono::DateTime::parse_from_rfc3339(&last_active_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        message_count: row.get::<_, i64>(8)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        SessionManager::new(conn)
    }

    #[test]
    fn create_then_activate() {
        let mgr = manager();
        mgr.create(1, "default", "claude-cli-default", "u-1").unwrap();
        assert!(mgr.get_active(1).unwrap().is_none());

        let active = mgr.activate(1, "default").unwrap();
        assert!(active.is_active);
        assert_eq!(mgr.get_active(1).unwrap().unwrap().name, "default");
    }

    #[test]
    fn activate_enforces_single_active_session() {
        let mgr = manager();
        mgr.create(1, "default", "claude-cli-default", "u-1").unwrap();
        mgr.create(1, "work", "claude-cli-default", "u-1").unwrap();

        mgr.activate(1, "default").unwrap();
        mgr.activate(1, "work").unwrap();

        let sessions = mgr.list(1).unwrap();
        let active: Vec<_> = sessions.iter().filter(|s| s.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "work");
    }

    #[test]
    fn touch_increments_count_and_sets_handle() {
        let mgr = manager();
        mgr.create(1, "default", "claude-cli-default", "u-1").unwrap();
        mgr.activate(1, "default").unwrap();

        mgr.touch(1, "default", Some("handle-abc")).unwrap();
        let s = mgr.get(1, "default").unwrap().unwrap();
        assert_eq!(s.message_count, 1);
        assert_eq!(s.backend_session_handle.as_deref(), Some("handle-abc"));

        mgr.touch(1, "default", None).unwrap();
        let s = mgr.get(1, "default").unwrap().unwrap();
        assert_eq!(s.message_count, 2);
        assert_eq!(s.backend_session_handle.as_deref(), Some("handle-abc"));
    }

    #[test]
    fn touch_missing_session_errors() {
        let mgr = manager();
        assert!(mgr.touch(1, "ghost", None).is_err());
    }

    #[test]
    fn rotation_name_falls_back_to_numeric_suffix() {
        let mgr = manager();
        let first = mgr.next_rotation_name(1, "default").unwrap();
        mgr.create(1, &first, "claude-cli-default", "u-1").unwrap();

        let second = mgr.next_rotation_name(1, "default").unwrap();
        assert_ne!(first, second);
        assert!(second.starts_with(&first));
    }

    #[test]
    fn delete_missing_errors() {
        let mgr = manager();
        assert!(mgr.delete(1, "ghost").is_err());
    }
}
