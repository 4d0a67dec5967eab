use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("blocker not found: {0}")]
    BlockerNotFound(String),

    #[error("validation: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;

impl From<TaskError> for homestead_core::HomesteadError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::Database(err) => homestead_core::HomesteadError::Internal(err.to_string()),
            TaskError::NotFound(id) => homestead_core::HomesteadError::NotFound(format!("task {id}")),
            TaskError::BlockerNotFound(id) => {
                homestead_core::HomesteadError::NotFound(format!("blocker {id}"))
            }
            TaskError::Validation(msg) => homestead_core::HomesteadError::Validation(msg),
        }
    }
}
