use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Standard 5-field minute/hour/day-of-month/month/day-of-week cron
    /// expression, evaluated in UTC.
    Cron { expression: String },
    /// Positive integer seconds between fires.
    Interval { every_secs: i64 },
    /// Fires at most once, at the given instant.
    Once { at: DateTime<Utc> },
}

impl Schedule {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Schedule::Cron { .. } => "cron",
            Schedule::Interval { .. } => "interval",
            Schedule::Once { .. } => "once",
        }
    }

    /// The form-dependent expression string persisted alongside `kind`.
    pub fn expression_str(&self) -> String {
        match self {
            Schedule::Cron { expression } => expression.clone(),
            Schedule::Interval { every_secs } => every_secs.to_string(),
            Schedule::Once { at } => at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Outbox,
    Command,
    Webhook,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Outbox => "outbox",
            ActionKind::Command => "command",
            ActionKind::Webhook => "webhook",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "outbox" => Ok(ActionKind::Outbox),
            "command" => Ok(ActionKind::Command),
            "webhook" => Ok(ActionKind::Webhook),
            other => Err(format!("unknown action kind: {other}")),
        }
    }
}

/// `{chat_id, agent_name, message}` per the job-action config contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxActionConfig {
    pub chat_id: i64,
    pub agent_name: String,
    pub message: String,
}

/// `{command, args, timeout}` (timeout defaults to 60s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandActionConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_action_timeout")]
    pub timeout: u64,
}

/// `{url, method, headers, body}` (method defaults to POST).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookActionConfig {
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_action_timeout")]
    pub timeout: u64,
}

fn default_action_timeout() -> u64 {
    60
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

/// An action attached to a job. `action_config` is stored as raw JSON and
/// decoded per `action_kind` only when the job fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action_kind", rename_all = "snake_case")]
pub enum Action {
    Outbox(OutboxActionConfig),
    Command(CommandActionConfig),
    Webhook(WebhookActionConfig),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Outbox(_) => ActionKind::Outbox,
            Action::Command(_) => ActionKind::Command,
            Action::Webhook(_) => ActionKind::Webhook,
        }
    }
}

/// A scheduled trigger bound to an [`Action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: Schedule,
    pub action: Action,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub source: Option<String>,
}

/// Fields accepted when creating a job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schedule: Schedule,
    pub action: Action,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
}
