use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid target: chat {0} is not in the allow-list")]
    InvalidTarget(i64),

    #[error("message not found: {0}")]
    NotFound(i64),
}

pub type Result<T> = std::result::Result<T, OutboxError>;

impl From<OutboxError> for homestead_core::HomesteadError {
    fn from(e: OutboxError) -> Self {
        match e {
            OutboxError::Database(err) => homestead_core::HomesteadError::Internal(err.to_string()),
            OutboxError::InvalidTarget(chat_id) => {
                homestead_core::HomesteadError::Validation(format!("invalid target: {chat_id}"))
            }
            OutboxError::NotFound(id) => homestead_core::HomesteadError::NotFound(format!("outbox message {id}")),
        }
    }
}
