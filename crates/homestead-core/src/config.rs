use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{HomesteadError, Result};

/// Top-level configuration (`homestead.toml` + `HOMESTEAD_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomesteadConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub allow: AllowConfig,
    #[serde(default)]
    pub turns: TurnsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub agents: HashMap<String, AgentIdentity>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl Default for HomesteadConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            allow: AllowConfig::default(),
            turns: TurnsConfig::default(),
            scheduler: SchedulerConfig::default(),
            outbox: OutboxConfig::default(),
            sessions: SessionsConfig::default(),
            models: ModelsConfig::default(),
            backends: BackendsConfig::default(),
            agents: default_agent_registry(),
            gateway: GatewayConfig::default(),
            telegram: None,
        }
    }
}

impl HomesteadConfig {
    /// Load config from a TOML file with `HOMESTEAD_*` env var overrides.
    ///
    /// Falls back to `~/.homestead/homestead.toml` when no explicit path is given.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: HomesteadConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("HOMESTEAD_").split("_"))
            .extract()
            .map_err(|e| HomesteadError::Validation(format!("config error: {e}")))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.homestead/homestead.toml")
}

/// Data-at-rest layout: the root directory each store's SQLite file lives under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_root")]
    pub root: String,
    #[serde(default = "default_identity_root")]
    pub identity_root: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_data_root(),
            identity_root: default_identity_root(),
        }
    }
}

fn default_data_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.homestead/data")
}

fn default_identity_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.homestead/identity")
}

/// Allow-listed user/chat identifiers. Deny-by-default; see `homestead_core::allow`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowConfig {
    #[serde(default)]
    pub users: Vec<String>,
}

/// Turn-queue and model-dispatcher timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnsConfig {
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
    #[serde(default = "default_guard_timeout_secs")]
    pub guard_timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for TurnsConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_turn_timeout_secs(),
            guard_timeout_secs: default_guard_timeout_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_turn_timeout_secs() -> u64 {
    300
}
fn default_guard_timeout_secs() -> u64 {
    330
}
fn default_queue_capacity() -> usize {
    5
}

/// Job-scheduler tick and action timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            action_timeout_secs: default_action_timeout_secs(),
        }
    }
}

fn default_tick_ms() -> u64 {
    1_000
}
fn default_action_timeout_secs() -> u64 {
    60
}

/// Outbox drain-loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_claim_batch")]
    pub claim_batch: usize,
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            claim_batch: default_claim_batch(),
            retry_ceiling: default_retry_ceiling(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    2
}
fn default_claim_batch() -> usize {
    20
}
fn default_retry_ceiling() -> u32 {
    3
}

/// Session inactivity/rotation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_inactivity_hours")]
    pub inactivity_hours: i64,
    #[serde(default = "default_session_name")]
    pub default_name: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            inactivity_hours: default_inactivity_hours(),
            default_name: default_session_name(),
        }
    }
}

fn default_inactivity_hours() -> i64 {
    4
}
fn default_session_name() -> String {
    "default".to_string()
}

/// Model-tag registry: the closed set of tags configurable sessions may select.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model_bindings")]
    pub bindings: HashMap<String, ModelBinding>,
    #[serde(default = "default_model_tag")]
    pub default_tag: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            bindings: default_model_bindings(),
            default_tag: default_model_tag(),
        }
    }
}

fn default_model_tag() -> String {
    "claude-cli-default".to_string()
}

/// One model tag's binding to a backend kind and backend-specific identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBinding {
    pub backend: BackendKind,
    /// Backend-specific model identifier, e.g. "sonnet", "opus", "grok-2-latest".
    /// `None` means "let the backend use its own default".
    pub backend_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    ClaudeCli,
    HttpChat,
}

fn default_model_bindings() -> HashMap<String, ModelBinding> {
    let mut m = HashMap::new();
    m.insert(
        "claude-cli-default".to_string(),
        ModelBinding {
            backend: BackendKind::ClaudeCli,
            backend_model: None,
        },
    );
    m.insert(
        "claude-cli-sonnet".to_string(),
        ModelBinding {
            backend: BackendKind::ClaudeCli,
            backend_model: Some("sonnet".to_string()),
        },
    );
    m.insert(
        "claude-cli-opus".to_string(),
        ModelBinding {
            backend: BackendKind::ClaudeCli,
            backend_model: Some("opus".to_string()),
        },
    );
    m.insert(
        "claude-cli-haiku".to_string(),
        ModelBinding {
            backend: BackendKind::ClaudeCli,
            backend_model: Some("haiku".to_string()),
        },
    );
    m.insert(
        "xai-grok".to_string(),
        ModelBinding {
            backend: BackendKind::HttpChat,
            backend_model: Some("grok-2-latest".to_string()),
        },
    );
    m
}

/// Backend process/credential configuration, consumed by `homestead-dispatcher`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_claude_cli_path")]
    pub claude_cli_path: String,
    pub xai_api_key: Option<String>,
    #[serde(default = "default_xai_base_url")]
    pub xai_base_url: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            claude_cli_path: default_claude_cli_path(),
            xai_api_key: None,
            xai_base_url: default_xai_base_url(),
        }
    }
}

fn default_claude_cli_path() -> String {
    "claude".to_string()
}
fn default_xai_base_url() -> String {
    "https://api.x.ai".to_string()
}

/// One entry in the static agent registry (`[agents.<name>]`), used to format
/// non-bot-originated outbox deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub display_name: String,
    pub emoji: String,
    #[serde(default = "default_model_tag")]
    pub preferred_model_tag: String,
}

fn default_agent_registry() -> HashMap<String, AgentIdentity> {
    let mut m = HashMap::new();
    m.insert(
        "bot".to_string(),
        AgentIdentity {
            display_name: "Homestead".to_string(),
            emoji: String::new(),
            preferred_model_tag: default_model_tag(),
        },
    );
    m.insert(
        "almanac".to_string(),
        AgentIdentity {
            display_name: "Almanac".to_string(),
            emoji: "🗓️".to_string(),
            preferred_model_tag: default_model_tag(),
        },
    );
    m
}

/// HTTP/WS gateway bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    /// Shared bearer token guarding the HTTP/WS surface: a trusted shared
    /// secret, not cryptographic channel authentication.
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth_token: None,
        }
    }
}

fn default_gateway_port() -> u16 {
    8089
}
fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
    #[serde(default)]
    pub require_mention: bool,
}

fn bool_true() -> bool {
    true
}
