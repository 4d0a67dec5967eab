use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnQueueError {
    #[error("chat's turn queue is full")]
    Backpressure,
}

pub type Result<T> = std::result::Result<T, TurnQueueError>;

impl From<TurnQueueError> for homestead_core::HomesteadError {
    fn from(e: TurnQueueError) -> Self {
        match e {
            TurnQueueError::Backpressure => homestead_core::HomesteadError::Transport(e.to_string()),
        }
    }
}
