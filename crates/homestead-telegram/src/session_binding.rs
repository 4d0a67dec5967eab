//! Resolves the active session for an inbound chat message, applying the
//! staleness-triggered rotation described for the channel driver: if no
//! session is active, or the active one has been idle past the configured
//! window, a fresh session is created and activated in its place.

use chrono::Utc;
use homestead_sessions::{Result, Session, SessionManager};

#[allow(clippy::too_many_arguments)]
pub fn resolve_active_session(
    sessions: &SessionManager,
    chat_id: i64,
    user_id: &str,
    default_name: &str,
    default_model_tag: &str,
    inactivity_hours: i64,
) -> Result<Session> {
    let now = Utc::now();

    if let Some(active) = sessions.get_active(chat_id)? {
        let idle = now.signed_duration_since(active.last_active_at);
        if idle <= chrono::Duration::hours(inactivity_hours) {
            return Ok(active);
        }
        let rotated = sessions.next_rotation_name(chat_id, default_name)?;
        sessions.create(chat_id, &rotated, default_model_tag, user_id)?;
        return sessions.activate(chat_id, &rotated);
    }

    if sessions.get(chat_id, default_name)?.is_none() {
        sessions.create(chat_id, default_name, default_model_tag, user_id)?;
    }
    sessions.activate(chat_id, default_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn manager() -> SessionManager {
        let conn = Connection::open_in_memory().unwrap();
        homestead_sessions::db::init_db(&conn).unwrap();
        SessionManager::new(conn)
    }

    #[test]
    fn first_message_creates_and_activates_default() {
        let mgr = manager();
        let session = resolve_active_session(&mgr, 1, "u-1", "default", "claude-cli-default", 4).unwrap();
        assert_eq!(session.name, "default");
        assert!(session.is_active);
    }

    #[test]
    fn fresh_active_session_is_reused() {
        let mgr = manager();
        let first = resolve_active_session(&mgr, 1, "u-1", "default", "claude-cli-default", 4).unwrap();
        let second = resolve_active_session(&mgr, 1, "u-1", "default", "claude-cli-default", 4).unwrap();
        assert_eq!(first.name, second.name);
    }

    #[test]
    fn stale_active_session_triggers_rotation() {
        let mgr = manager();
        mgr.create(1, "default", "claude-cli-default", "u-1").unwrap();
        mgr.activate(1, "default").unwrap();

        // Force staleness with a zero-hour window: any elapsed time counts.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let rotated = resolve_active_session(&mgr, 1, "u-1", "default", "claude-cli-default", 0).unwrap();
        assert_ne!(rotated.name, "default");
        assert!(rotated.name.starts_with("default-"));
        assert!(rotated.is_active);
    }
}
