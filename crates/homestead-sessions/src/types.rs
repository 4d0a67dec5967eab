use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted, named conversation session for one chat.
///
/// Sessions are lazy-created on first turn for a chat. At most one session
/// per `chat_id` is active at a time — see [`crate::manager::SessionManager::activate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub chat_id: i64,
    pub name: String,
    pub user_id: String,
    /// Opaque handle the backend returns to resume this thread. Never
    /// interpreted by the store.
    pub backend_session_handle: Option<String>,
    /// Enumerated model tag, validated against the allow-list at the API
    /// boundary — not by the store itself.
    pub model: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub message_count: u64,
}
