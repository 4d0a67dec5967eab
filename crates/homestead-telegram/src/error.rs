use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("teloxide error: {0}")]
    Teloxide(#[from] teloxide::RequestError),

    #[error("no bot token configured")]
    NoToken,
}

pub type Result<T> = std::result::Result<T, TelegramError>;

impl From<TelegramError> for homestead_core::HomesteadError {
    fn from(e: TelegramError) -> Self {
        homestead_core::HomesteadError::Transport(e.to_string())
    }
}
