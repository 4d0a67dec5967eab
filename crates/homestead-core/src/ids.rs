use serde::{Deserialize, Serialize};

/// The chat a session, turn, or outbox message belongs to.
///
/// Opaque beyond ordering/equality — callers (Telegram, the web channel)
/// decide how to map their own identifiers into this space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(v: i64) -> Self {
        ChatId(v)
    }
}
