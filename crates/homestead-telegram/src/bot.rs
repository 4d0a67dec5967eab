//! Telegram channel driver: long-polls for updates, enforces the allow-list
//! and DM/mention guards, resolves session binding, and drives turns through
//! the turn queue with rate-limited streaming edits.

use std::sync::Arc;
use std::time::Duration;

use homestead_core::config::TelegramConfig;
use homestead_dispatcher::StreamEvent;
use homestead_sessions::SessionManager;
use homestead_turnqueue::{Turn, TurnOutcome, TurnQueue};
use teloxide::prelude::*;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use crate::commands;
use crate::send;
use crate::typing::TypingHandle;

/// Minimum interval between edits to a streaming placeholder message.
const STREAM_EDIT_INTERVAL: Duration = Duration::from_millis(1500);

/// Shared state handed to every update handler via `dptree` dependency
/// injection.
pub struct BotState {
    pub sessions: Arc<SessionManager>,
    pub turn_queue: Arc<TurnQueue>,
    pub allow_users: Vec<String>,
    pub dm_allowed: bool,
    pub require_mention: bool,
    pub default_session_name: String,
    pub default_model_tag: String,
    pub inactivity_hours: i64,
    pub guard_timeout: Duration,
    pub model_tags: Vec<String>,
}

pub struct TelegramBot {
    bot_token: String,
    state: Arc<BotState>,
}

impl TelegramBot {
    pub fn new(config: &TelegramConfig, state: Arc<BotState>) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            state,
        }
    }

    /// Connect and drive the long-polling loop until `shutdown_rx` flips.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let bot = Bot::new(&self.bot_token);
        let state = self.state;

        let handler = Update::filter_message().endpoint(handle_message);

        let mut dispatcher = Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![state])
            .default_handler(|_upd| async {})
            .build();

        info!("telegram bot starting long-polling dispatcher");
        let shutdown_token = dispatcher.shutdown_token();
        let dispatch_task = tokio::spawn(async move { dispatcher.dispatch().await });

        let _ = shutdown_rx.changed().await;
        if *shutdown_rx.borrow() {
            info!("telegram bot shutting down");
            if let Ok(fut) = shutdown_token.shutdown() {
                fut.await;
            }
        }
        let _ = dispatch_task.await;
    }
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(());
    }
    let from = match msg.from.as_ref() {
        Some(u) => u,
        None => return Ok(()),
    };
    let username = from.username.as_deref().unwrap_or("");
    let user_id = from.id.0.to_string();

    if !homestead_core::allow::is_allowed(&state.allow_users, username, &user_id) {
        return Ok(());
    }

    if msg.chat.is_private() && !state.dm_allowed {
        return Ok(());
    }

    if (msg.chat.is_group() || msg.chat.is_supergroup()) && state.require_mention {
        let bot_username = bot
            .get_me()
            .await
            .ok()
            .and_then(|me| me.user.username.clone())
            .unwrap_or_default();
        let text_for_mention = msg.text().or(msg.caption()).unwrap_or("");
        if bot_username.is_empty() || !text_for_mention.contains(&format!("@{bot_username}")) {
            return Ok(());
        }
    }

    let text = msg.text().or(msg.caption()).unwrap_or("").to_string();
    if text.is_empty() {
        return Ok(());
    }

    let chat_id = msg.chat.id;

    if text.starts_with('/') {
        if let Some(reply) = commands::handle_command(&text, chat_id.0, &user_id, &state) {
            send::send_response(&bot, chat_id, &reply).await;
            return Ok(());
        }
    }

    let session = match crate::session_binding::resolve_active_session(
        &state.sessions,
        chat_id.0,
        &user_id,
        &state.default_session_name,
        &state.default_model_tag,
        state.inactivity_hours,
    ) {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "telegram: session binding failed");
            send::send_response(&bot, chat_id, "Could not open a session for this chat.").await;
            return Ok(());
        }
    };

    tokio::spawn(run_turn(bot, chat_id, state, session.name, text));
    Ok(())
}

async fn run_turn(bot: Bot, chat_id: ChatId, state: Arc<BotState>, session_name: String, text: String) {
    let typing = TypingHandle::start(bot.clone(), chat_id);
    let (delta_tx, delta_rx) = mpsc::channel(64);
    let (done_tx, done_rx) = oneshot::channel();

    let turn = Turn {
        chat_id: homestead_core::ChatId(chat_id.0),
        session_name,
        user_text: text,
        on_delta: delta_tx,
        done: done_tx,
    };

    if state.turn_queue.enqueue(turn).is_err() {
        typing.stop();
        send::send_response(
            &bot,
            chat_id,
            "Still working on your previous message here. Try again in a moment.",
        )
        .await;
        return;
    }

    let placeholder = bot.send_message(chat_id, "\u{2026}").await.ok();

    let outcome = match tokio::time::timeout(
        state.guard_timeout,
        drain_stream(&bot, chat_id, placeholder.as_ref().map(|m| m.id), delta_rx, done_rx),
    )
    .await
    {
        Ok((text, outcome)) => Some((text, outcome)),
        Err(_) => {
            state.turn_queue.cancel(homestead_core::ChatId(chat_id.0));
            error!(chat_id = chat_id.0, "telegram: turn exceeded outer guard timeout");
            None
        }
    };

    typing.stop();

    match outcome {
        Some((accumulated, TurnOutcome::Completed)) => {
            if let Some(ref msg) = placeholder {
                let _ = bot.delete_message(chat_id, msg.id).await;
            }
            send::send_response(&bot, chat_id, &accumulated).await;
        }
        Some((_, TurnOutcome::Failed { message, .. })) => {
            finalize_failure(&bot, chat_id, placeholder.as_ref().map(|m| m.id), &message).await;
        }
        None => {
            finalize_failure(
                &bot,
                chat_id,
                placeholder.as_ref().map(|m| m.id),
                "This took too long and was cancelled.",
            )
            .await;
        }
    }
}

async fn finalize_failure(bot: &Bot, chat_id: ChatId, placeholder: Option<teloxide::types::MessageId>, message: &str) {
    let body = format!("\u{26a0}\u{fe0f} {message}");
    match placeholder {
        Some(id) => {
            if bot.edit_message_text(chat_id, id, &body).await.is_err() {
                send::send_response(bot, chat_id, &body).await;
            }
        }
        None => send::send_response(bot, chat_id, &body).await,
    }
}

/// Drains deltas from `delta_rx`, periodically editing the placeholder
/// message, and returns the accumulated text plus the turn's terminal
/// outcome once `done_rx` resolves.
async fn drain_stream(
    bot: &Bot,
    chat_id: ChatId,
    placeholder: Option<teloxide::types::MessageId>,
    mut delta_rx: mpsc::Receiver<StreamEvent>,
    done_rx: oneshot::Receiver<TurnOutcome>,
) -> (String, TurnOutcome) {
    let mut accumulated = String::new();
    let mut last_edit = tokio::time::Instant::now()
        .checked_sub(STREAM_EDIT_INTERVAL)
        .unwrap_or_else(tokio::time::Instant::now);

    while let Some(event) = delta_rx.recv().await {
        if let StreamEvent::Delta { text } = event {
            accumulated.push_str(&text);
            if last_edit.elapsed() >= STREAM_EDIT_INTERVAL {
                if let Some(id) = placeholder {
                    let preview = truncate_for_edit(&accumulated);
                    let _ = bot.edit_message_text(chat_id, id, preview).await;
                }
                last_edit = tokio::time::Instant::now();
            }
        }
    }

    let outcome = done_rx.await.unwrap_or(TurnOutcome::Failed {
        kind: homestead_dispatcher::DispatchErrorKind::Backend,
        message: "turn worker ended without a result".to_string(),
    });
    (accumulated, outcome)
}

fn truncate_for_edit(text: &str) -> String {
    if text.len() <= send::CHUNK_MAX {
        return text.to_string();
    }
    let mut start = text.len() - send::CHUNK_MAX;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
