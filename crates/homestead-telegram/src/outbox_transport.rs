//! Implements `homestead_outbox::OutboxTransport` so the outbox drainer can
//! deliver queued messages through the Telegram bot, formatted per the
//! static agent registry (display name + emoji prefix).

use std::collections::HashMap;

use async_trait::async_trait;
use homestead_core::config::AgentIdentity;
use homestead_outbox::{OutboxMessage, OutboxTransport};
use teloxide::prelude::*;

use crate::send;

pub struct TelegramOutboxTransport {
    bot: Bot,
    agents: HashMap<String, AgentIdentity>,
}

impl TelegramOutboxTransport {
    pub fn new(bot: Bot, agents: HashMap<String, AgentIdentity>) -> Self {
        Self { bot, agents }
    }

    fn format_body(&self, msg: &OutboxMessage) -> String {
        if msg.agent_name == "bot" {
            return msg.body.clone();
        }
        match self.agents.get(&msg.agent_name) {
            Some(identity) if !identity.emoji.is_empty() => {
                format!("{} **{}**\n\n{}", identity.emoji, identity.display_name, msg.body)
            }
            Some(identity) => format!("**{}**\n\n{}", identity.display_name, msg.body),
            None => msg.body.clone(),
        }
    }
}

#[async_trait]
impl OutboxTransport for TelegramOutboxTransport {
    async fn deliver(&self, msg: &OutboxMessage) -> Result<(), String> {
        let chat_id = ChatId(msg.chat_id);
        let body = self.format_body(msg);
        send::deliver_chunks(&self.bot, chat_id, &body, msg.parse_mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HashMap<String, AgentIdentity> {
        let mut m = HashMap::new();
        m.insert(
            "bot".to_string(),
            AgentIdentity {
                display_name: "Homestead".to_string(),
                emoji: String::new(),
                preferred_model_tag: "claude-cli-default".to_string(),
            },
        );
        m.insert(
            "almanac".to_string(),
            AgentIdentity {
                display_name: "Almanac".to_string(),
                emoji: "\u{1F5D3}\u{FE0F}".to_string(),
                preferred_model_tag: "claude-cli-default".to_string(),
            },
        );
        m
    }

    fn msg(agent_name: &str, body: &str) -> OutboxMessage {
        OutboxMessage {
            id: 1,
            chat_id: 100,
            agent_name: agent_name.to_string(),
            body: body.to_string(),
            parse_mode: homestead_outbox::ParseMode::Html,
            created_at: chrono::Utc::now(),
            sent_at: None,
            status: homestead_outbox::OutboxStatus::Pending,
            failure_reason: None,
        }
    }

    fn transport() -> TelegramOutboxTransport {
        TelegramOutboxTransport {
            bot: Bot::new("000:test-token"),
            agents: registry(),
        }
    }

    #[test]
    fn bot_agent_is_delivered_verbatim() {
        let t = transport();
        assert_eq!(t.format_body(&msg("bot", "hi there")), "hi there");
    }

    #[test]
    fn other_agent_is_prefixed_with_emoji_and_display_name() {
        let t = transport();
        let body = t.format_body(&msg("almanac", "morning"));
        assert_eq!(body, "\u{1F5D3}\u{FE0F} **Almanac**\n\nmorning");
    }

    #[test]
    fn unknown_agent_falls_back_to_plain_body() {
        let t = transport();
        assert_eq!(t.format_body(&msg("ghost", "boo")), "boo");
    }
}
