use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use homestead_core::config::BackendKind;
use homestead_core::HomesteadConfig;
use homestead_dispatcher::{ClaudeCliProvider, HttpChatProvider, ModelBackend, ProviderRouter};
use homestead_eventlog::{EventLogLayer, EventLogStore};
use homestead_outbox::OutboxStore;
use homestead_scheduler::{JobStore, SchedulerEngine};
use homestead_sessions::SessionManager;
use homestead_tasks::TaskStore;
use homestead_telegram::{BotState, TelegramBot, TelegramOutboxTransport};
use homestead_turnqueue::TurnQueue;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

mod app;
mod auth;
mod http;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("HOMESTEAD_CONFIG").ok();
    let config = HomesteadConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("config load failed ({e}), using defaults");
        HomesteadConfig::default()
    });

    std::fs::create_dir_all(&config.data.root)?;

    let eventlog = Arc::new(EventLogStore::open(&format!(
        "{}/eventlog.db",
        config.data.root
    ))?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homestead_gateway=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(EventLogLayer::new(eventlog.clone()))
        .init();

    let outbox = Arc::new(OutboxStore::open(&format!(
        "{}/outbox.db",
        config.data.root
    ))?);
    let sessions = Arc::new(SessionManager::open(&format!(
        "{}/sessions.db",
        config.data.root
    ))?);
    let tasks = Arc::new(TaskStore::open(&format!("{}/tasks.db", config.data.root))?);
    let jobs = Arc::new(JobStore::open(&format!(
        "{}/scheduler.db",
        config.data.root
    ))?);

    let router = build_provider_router(&config);
    let backend_models: HashMap<String, Option<String>> = config
        .models
        .bindings
        .iter()
        .map(|(tag, binding)| (tag.clone(), binding.backend_model.clone()))
        .collect();
    let model_tags: Vec<String> = config.models.bindings.keys().cloned().collect();

    let turn_queue = Arc::new(TurnQueue::new(
        sessions.clone(),
        Arc::new(router),
        backend_models,
        config.turns.queue_capacity,
        Duration::from_secs(config.turns.turn_timeout_secs),
    ));

    let scheduler = Arc::new(SchedulerEngine::new(
        jobs,
        outbox.clone(),
        config.allow.users.clone(),
        Duration::from_millis(config.scheduler.tick_ms),
    ));

    let missed = scheduler.mark_missed_on_startup().await;
    if missed > 0 {
        info!(count = missed, "fired overdue jobs once on restart");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut background = Vec::new();

    {
        let scheduler = scheduler.clone();
        let rx = shutdown_rx.clone();
        background.push(tokio::spawn(async move {
            scheduler.run(rx).await;
        }));
    }

    if let Some(telegram_config) = config.telegram.clone() {
        let bot_state = Arc::new(BotState {
            sessions: sessions.clone(),
            turn_queue: turn_queue.clone(),
            allow_users: config.allow.users.clone(),
            dm_allowed: telegram_config.dm_allowed,
            require_mention: telegram_config.require_mention,
            default_session_name: config.sessions.default_name.clone(),
            default_model_tag: config.models.default_tag.clone(),
            inactivity_hours: config.sessions.inactivity_hours,
            guard_timeout: Duration::from_secs(config.turns.guard_timeout_secs),
            model_tags: model_tags.clone(),
        });

        let bot = TelegramBot::new(&telegram_config, bot_state);
        let rx = shutdown_rx.clone();
        background.push(tokio::spawn(async move {
            bot.run(rx).await;
        }));

        let transport = Arc::new(TelegramOutboxTransport::new(
            teloxide::Bot::new(telegram_config.bot_token.clone()),
            config.agents.clone(),
        ));
        let drainer = outbox.clone().take_drainer(
            transport,
            Duration::from_secs(config.outbox.poll_interval_secs),
            config.outbox.retry_ceiling,
        );
        let rx = shutdown_rx.clone();
        background.push(tokio::spawn(async move {
            drainer.run(rx).await;
        }));
    } else {
        warn!("no [telegram] config section: outbox drainer and Telegram channel are disabled");
    }

    let app_state = Arc::new(app::AppState {
        config: config.clone(),
        model_tags,
        eventlog,
        outbox,
        sessions,
        tasks,
        scheduler,
        turn_queue,
    });
    let router = app::build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!(%addr, "homestead gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    serve.await?;

    for handle in background {
        let _ = handle.await;
    }

    Ok(())
}

fn build_provider_router(config: &HomesteadConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new();
    let claude: Arc<dyn ModelBackend> =
        Arc::new(ClaudeCliProvider::new(config.backends.claude_cli_path.clone()));
    let xai: Arc<dyn ModelBackend> = Arc::new(HttpChatProvider::new(
        config.backends.xai_base_url.clone(),
        config.backends.xai_api_key.clone().unwrap_or_default(),
    ));

    for (tag, binding) in &config.models.bindings {
        let backend = match binding.backend {
            BackendKind::ClaudeCli => claude.clone(),
            BackendKind::HttpChat => xai.clone(),
        };
        router.bind(tag.clone(), backend);
    }
    router
}
