use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Formatting hint for outbound message content — mirrors the chat
/// transport's own markup dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    #[default]
    Html,
    MarkdownV2,
    PlainText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "sent" => Ok(OutboxStatus::Sent),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

/// A durable FIFO mailbox entry destined for one chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: i64,
    pub chat_id: i64,
    /// References the agent registry for emoji/display-name formatting.
    pub agent_name: String,
    pub body: String,
    pub parse_mode: ParseMode,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: OutboxStatus,
    /// Set only when `status = failed`.
    pub failure_reason: Option<String>,
}
