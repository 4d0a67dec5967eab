//! Slash commands local to the Telegram channel driver. Every command
//! reduces to a session-store operation; there is no command-specific
//! persistence here.

use crate::bot::BotState;

/// Handle a slash command. Returns `Some(reply)` if `text` was a recognized
/// command, `None` if it should fall through to the conversational turn.
pub fn handle_command(text: &str, chat_id: i64, user_id: &str, state: &BotState) -> Option<String> {
    let trimmed = text.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim();

    match cmd.to_ascii_lowercase().as_str() {
        "/new" => Some(cmd_new(chat_id, user_id, arg, state)),
        "/switch" => Some(cmd_switch(chat_id, arg, state)),
        "/model" => Some(cmd_model(chat_id, arg, state)),
        "/reset" => Some(cmd_reset(chat_id, user_id, state)),
        "/status" => Some(cmd_status(chat_id, state)),
        "/sessions" => Some(cmd_sessions(chat_id, state)),
        _ => None,
    }
}

fn cmd_new(chat_id: i64, user_id: &str, arg: &str, state: &BotState) -> String {
    if arg.is_empty() {
        return "Usage: /new <session-name>".to_string();
    }
    match state
        .sessions
        .create(chat_id, arg, &state.default_model_tag, user_id)
        .and_then(|_| state.sessions.activate(chat_id, arg))
    {
        Ok(session) => format!("Created and switched to session `{}` (model `{}`).", session.name, session.model),
        Err(e) => format!("Could not create session `{arg}`: {e}"),
    }
}

fn cmd_switch(chat_id: i64, arg: &str, state: &BotState) -> String {
    if arg.is_empty() {
        return "Usage: /switch <session-name>".to_string();
    }
    match state.sessions.activate(chat_id, arg) {
        Ok(session) => format!("Switched to session `{}` (model `{}`).", session.name, session.model),
        Err(e) => format!("No such session `{arg}`: {e}"),
    }
}

fn cmd_model(chat_id: i64, arg: &str, state: &BotState) -> String {
    if arg.is_empty() {
        return format!("Usage: /model <tag>\nAvailable: {}", state.model_tags.join(", "));
    }
    if !state.model_tags.iter().any(|t| t == arg) {
        return format!("Unknown model tag `{arg}`. Available: {}", state.model_tags.join(", "));
    }
    let active = match state.sessions.get_active(chat_id) {
        Ok(Some(session)) => session,
        Ok(None) => return "No active session. Send a message or use /new first.".to_string(),
        Err(e) => return format!("Could not read active session: {e}"),
    };
    match state.sessions.set_model(chat_id, &active.name, arg) {
        Ok(()) => format!("Session `{}` now uses model `{arg}`.", active.name),
        Err(e) => format!("Could not change model: {e}"),
    }
}

fn cmd_reset(chat_id: i64, user_id: &str, state: &BotState) -> String {
    let rotated = match state.sessions.next_rotation_name(chat_id, &state.default_session_name) {
        Ok(name) => name,
        Err(e) => return format!("Could not reset: {e}"),
    };
    match state
        .sessions
        .create(chat_id, &rotated, &state.default_model_tag, user_id)
        .and_then(|_| state.sessions.activate(chat_id, &rotated))
    {
        Ok(_) => format!("Started a fresh session `{rotated}`."),
        Err(e) => format!("Could not reset: {e}"),
    }
}

fn cmd_status(chat_id: i64, state: &BotState) -> String {
    match state.sessions.get_active(chat_id) {
        Ok(Some(session)) => format!(
            "Session `{}`\nModel: `{}`\nMessages: {}\nLast active: {}",
            session.name,
            session.model,
            session.message_count,
            session.last_active_at.to_rfc3339(),
        ),
        Ok(None) => "No active session yet. Send a message to start one.".to_string(),
        Err(e) => format!("Could not read status: {e}"),
    }
}

fn cmd_sessions(chat_id: i64, state: &BotState) -> String {
    match state.sessions.list(chat_id) {
        Ok(list) if !list.is_empty() => list
            .iter()
            .map(|s| format!("{} {} — {}", if s.is_active { "*" } else { " " }, s.name, s.model))
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(_) => "No sessions yet.".to_string(),
        Err(e) => format!("Could not list sessions: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::BotState;
    use homestead_dispatcher::ProviderRouter;
    use homestead_turnqueue::TurnQueue;
    use rusqlite::Connection;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> BotState {
        let conn = Connection::open_in_memory().unwrap();
        homestead_sessions::db::init_db(&conn).unwrap();
        let sessions = Arc::new(homestead_sessions::SessionManager::new(conn));
        let router = Arc::new(ProviderRouter::new());
        let turn_queue = Arc::new(TurnQueue::new(
            sessions.clone(),
            router,
            HashMap::new(),
            5,
            Duration::from_secs(300),
        ));
        BotState {
            sessions,
            turn_queue,
            allow_users: vec!["*".to_string()],
            dm_allowed: true,
            require_mention: false,
            default_session_name: "default".to_string(),
            default_model_tag: "claude-cli-default".to_string(),
            inactivity_hours: 4,
            guard_timeout: Duration::from_secs(330),
            model_tags: vec!["claude-cli-default".to_string(), "xai-grok".to_string()],
        }
    }

    #[test]
    fn new_then_switch_then_status() {
        let st = state();
        let reply = handle_command("/new work", 1, "u-1", &st).unwrap();
        assert!(reply.contains("Created and switched"));

        let reply = handle_command("/status", 1, "u-1", &st).unwrap();
        assert!(reply.contains("work"));

        handle_command("/new personal", 1, "u-1", &st).unwrap();
        let reply = handle_command("/switch work", 1, "u-1", &st).unwrap();
        assert!(reply.contains("Switched to session `work`"));
    }

    #[test]
    fn model_command_rejects_unknown_tag() {
        let st = state();
        handle_command("/new work", 1, "u-1", &st).unwrap();
        let reply = handle_command("/model bogus-tag", 1, "u-1", &st).unwrap();
        assert!(reply.contains("Unknown model tag"));
    }

    #[test]
    fn model_command_changes_active_session() {
        let st = state();
        handle_command("/new work", 1, "u-1", &st).unwrap();
        let reply = handle_command("/model xai-grok", 1, "u-1", &st).unwrap();
        assert!(reply.contains("now uses model `xai-grok`"));
    }

    #[test]
    fn reset_creates_rotated_session() {
        let st = state();
        handle_command("/new default", 1, "u-1", &st).unwrap();
        let reply = handle_command("/reset", 1, "u-1", &st).unwrap();
        assert!(reply.contains("Started a fresh session"));
    }

    #[test]
    fn unknown_command_falls_through() {
        let st = state();
        assert!(handle_command("/bogus", 1, "u-1", &st).is_none());
        assert!(handle_command("hello there", 1, "u-1", &st).is_none());
    }
}
