//! `homestead-scheduler` — the JS + SC components. Computes next-fire
//! instants for cron/interval/once jobs and fires their configured actions
//! (outbox enqueue, command, webhook) on a short tick.

pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod store;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use schedule::compute_next_run;
pub use store::JobStore;
pub use types::{
    Action, ActionKind, CommandActionConfig, Job, NewJob, OutboxActionConfig, Schedule,
    WebhookActionConfig,
};
