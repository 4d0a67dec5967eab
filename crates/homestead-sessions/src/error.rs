use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session by that `(chat_id, name)` exists.
    #[error("session not found: chat {chat_id} name {name}")]
    NotFound { chat_id: i64, name: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested model tag is not in the configured allow-list.
    #[error("unknown model tag: {0}")]
    UnknownModel(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl From<SessionError> for homestead_core::HomesteadError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound { chat_id, name } => {
                homestead_core::HomesteadError::NotFound(format!("session {chat_id}/{name}"))
            }
            SessionError::Database(err) => homestead_core::HomesteadError::Internal(err.to_string()),
            SessionError::UnknownModel(tag) => homestead_core::HomesteadError::Validation(format!(
                "unknown model tag: {tag}"
            )),
        }
    }
}
