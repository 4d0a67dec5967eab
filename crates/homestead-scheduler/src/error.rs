use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<SchedulerError> for homestead_core::HomesteadError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Database(err) => homestead_core::HomesteadError::Internal(err.to_string()),
            SchedulerError::NotFound(id) => homestead_core::HomesteadError::NotFound(format!("job {id}")),
            SchedulerError::InvalidSchedule(msg) => homestead_core::HomesteadError::Validation(msg),
            SchedulerError::Serde(err) => homestead_core::HomesteadError::Internal(err.to_string()),
        }
    }
}
