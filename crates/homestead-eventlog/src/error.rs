use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

pub type Result<T> = std::result::Result<T, EventLogError>;

impl From<EventLogError> for homestead_core::HomesteadError {
    fn from(e: EventLogError) -> Self {
        match e {
            EventLogError::Database(err) => homestead_core::HomesteadError::Internal(err.to_string()),
            EventLogError::InvalidQuery(msg) => homestead_core::HomesteadError::Validation(msg),
        }
    }
}
