use thiserror::Error;

/// The error taxonomy shared by every Homestead component.
///
/// Each crate defines its own `thiserror` enum for its collaborators (SQLite
/// errors, process-spawn errors, ...) and implements `From` into this type at
/// its public boundary, so the composition root and the HTTP/bot surfaces
/// only ever need to handle one error type.
#[derive(Debug, Error)]
pub enum HomesteadError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("backend: {0}")]
    Backend(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl HomesteadError {
    /// Lowercase taxonomy tag, suitable for API responses and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            HomesteadError::Validation(_) => "validation",
            HomesteadError::NotFound(_) => "not_found",
            HomesteadError::Conflict(_) => "conflict",
            HomesteadError::Transport(_) => "transport",
            HomesteadError::Timeout(_) => "timeout",
            HomesteadError::Backend(_) => "backend",
            HomesteadError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, HomesteadError>;
