use thiserror::Error;

/// The four failure classes a backend dispatch can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchErrorKind {
    Config,
    Transport,
    Timeout,
    Backend,
}

impl DispatchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchErrorKind::Config => "config",
            DispatchErrorKind::Transport => "transport",
            DispatchErrorKind::Timeout => "timeout",
            DispatchErrorKind::Backend => "backend",
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("dispatch timed out after {0}s")]
    Timeout(u64),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn kind(&self) -> DispatchErrorKind {
        match self {
            DispatchError::Config(_) => DispatchErrorKind::Config,
            DispatchError::Transport(_) => DispatchErrorKind::Transport,
            DispatchError::Timeout(_) => DispatchErrorKind::Timeout,
            DispatchError::Backend(_) => DispatchErrorKind::Backend,
            DispatchError::Cancelled => DispatchErrorKind::Transport,
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

impl From<DispatchError> for homestead_core::HomesteadError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Config(msg) => homestead_core::HomesteadError::Validation(msg),
            DispatchError::Transport(msg) => homestead_core::HomesteadError::Transport(msg),
            DispatchError::Timeout(secs) => homestead_core::HomesteadError::Timeout(secs),
            DispatchError::Backend(msg) => homestead_core::HomesteadError::Backend(msg),
            DispatchError::Cancelled => homestead_core::HomesteadError::Transport("dispatch cancelled".into()),
        }
    }
}
