use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use homestead_outbox::{OutboxStore, ParseMode};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::Result;
use crate::store::JobStore;
use crate::types::{Action, CommandActionConfig, Job, OutboxActionConfig, WebhookActionConfig};

/// Fires every enabled, due job on a short tick and dispatches its action.
/// A single `SchedulerEngine` per process scans `{enabled ∧ next_run_at ≤ now}`;
/// the atomic run-count transition and the action dispatch are deliberately
/// decoupled, so a failing action never undoes the recorded fire.
pub struct SchedulerEngine {
    jobs: Arc<JobStore>,
    outbox: Arc<OutboxStore>,
    allow_users: Vec<String>,
    http: reqwest::Client,
    tick: Duration,
}

impl SchedulerEngine {
    pub fn new(
        jobs: Arc<JobStore>,
        outbox: Arc<OutboxStore>,
        allow_users: Vec<String>,
        tick: Duration,
    ) -> Self {
        Self {
            jobs,
            outbox,
            allow_users,
            http: reqwest::Client::new(),
            tick,
        }
    }

    /// On restart, fire every overdue job exactly once — running its action
    /// and advancing `next_run_at` to the next future instant — rather than
    /// backfilling every instant missed while the process was offline.
    /// Shares the same fire path as a normal tick, so a job overdue by many
    /// instants still only runs (and only logs) once.
    pub async fn mark_missed_on_startup(&self) -> usize {
        self.tick_once().await
    }

    /// The underlying job store, for CRUD operations that don't need to
    /// go through the tick loop (listing, creation, manual fire).
    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Tick loop. Takes `&self` rather than consuming it so the same engine
    /// can be shared (behind an `Arc`) with the HTTP handlers that expose
    /// job CRUD and `run_now`.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("scheduler shutting down");
                        return;
                    }
                    continue;
                }
            }
            self.tick_once().await;
        }
    }

    /// Scan for due jobs, atomically record each fire, and dispatch its
    /// action. Returns the number of jobs fired this tick.
    async fn tick_once(&self) -> usize {
        let now = Utc::now();
        let due = match self.jobs.due(now) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "scheduler due-job scan failed");
                return 0;
            }
        };

        let mut fired_count = 0;
        for job in due {
            let fired = match self.jobs.record_fire(&job.id, now) {
                Ok(fired) => fired,
                Err(e) => {
                    warn!(error = %e, job_id = %job.id, "record_fire failed");
                    continue;
                }
            };
            self.dispatch_action(&fired).await;
            fired_count += 1;
        }
        fired_count
    }

    /// Run a job's action on demand, sharing the same atomic-transition +
    /// dispatch path the tick loop uses.
    pub async fn run_now(&self, job_id: &str) -> Result<Job> {
        let now = Utc::now();
        let fired = self.jobs.record_fire(job_id, now)?;
        self.dispatch_action(&fired).await;
        Ok(fired)
    }

    async fn dispatch_action(&self, job: &Job) {
        let result = match &job.action {
            Action::Outbox(cfg) => self.dispatch_outbox(cfg),
            Action::Command(cfg) => self.dispatch_command(cfg).await,
            Action::Webhook(cfg) => self.dispatch_webhook(cfg).await,
        };
        match result {
            Ok(()) => info!(job_id = %job.id, job_name = %job.name, "job fired"),
            Err(reason) => warn!(job_id = %job.id, job_name = %job.name, error = %reason, "job action failed"),
        }
    }

    fn dispatch_outbox(&self, cfg: &OutboxActionConfig) -> std::result::Result<(), String> {
        self.outbox
            .enqueue(
                cfg.chat_id,
                &cfg.agent_name,
                &cfg.message,
                ParseMode::Html,
                &self.allow_users,
            )
            .map(|_id| ())
            .map_err(|e| e.to_string())
    }

    async fn dispatch_command(&self, cfg: &CommandActionConfig) -> std::result::Result<(), String> {
        let mut cmd = tokio::process::Command::new(&cfg.command);
        cmd.args(&cfg.args).stdout(Stdio::piped()).stdin(Stdio::null()).stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| format!("spawn failed: {e}"))?;
        let output = tokio::time::timeout(Duration::from_secs(cfg.timeout), child.wait_with_output())
            .await
            .map_err(|_| "command timed out".to_string())?
            .map_err(|e| format!("command wait failed: {e}"))?;

        if !output.status.success() {
            return Err(format!(
                "command exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }

    async fn dispatch_webhook(&self, cfg: &WebhookActionConfig) -> std::result::Result<(), String> {
        let method = reqwest::Method::from_bytes(cfg.method.as_bytes())
            .map_err(|_| format!("invalid HTTP method: {}", cfg.method))?;

        let mut req = self.http.request(method, &cfg.url).body(cfg.body.clone());
        for (key, value) in &cfg.headers {
            req = req.header(key, value);
        }

        let resp = tokio::time::timeout(Duration::from_secs(cfg.timeout), req.send())
            .await
            .map_err(|_| "webhook timed out".to_string())?
            .map_err(|e| format!("webhook request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("webhook returned {}", resp.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JobStore;
    use crate::types::{NewJob, OutboxActionConfig, Schedule};
    use chrono::Duration as ChronoDuration;
    use homestead_outbox::OutboxStore;
    use rusqlite::Connection;

    fn engine() -> (Arc<JobStore>, SchedulerEngine) {
        let job_conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&job_conn).unwrap();
        let jobs = Arc::new(JobStore::new(job_conn));

        let outbox_conn = Connection::open_in_memory().unwrap();
        homestead_outbox::db::init_db(&outbox_conn).unwrap();
        let outbox = Arc::new(OutboxStore::new(outbox_conn));

        let engine = SchedulerEngine::new(
            jobs.clone(),
            outbox,
            vec!["100".to_string()],
            Duration::from_millis(10),
        );
        (jobs, engine)
    }

    /// S6: an interval job offline since before its due instant fires
    /// exactly once on restart, and its next fire is strictly in the future.
    #[tokio::test]
    async fn overdue_job_fires_exactly_once_on_restart() {
        let (jobs, engine) = engine();
        let job = jobs
            .create(NewJob {
                name: "heartbeat".to_string(),
                description: String::new(),
                schedule: Schedule::Interval { every_secs: 60 },
                action: Action::Outbox(OutboxActionConfig {
                    chat_id: 100,
                    agent_name: "almanac".to_string(),
                    message: "morning".to_string(),
                }),
                tags: Vec::new(),
                source: None,
            })
            .unwrap();

        // Simulate the process having been offline well past several
        // instants: next_run_at is far in the past.
        let overdue = Utc::now() - ChronoDuration::seconds(400);
        jobs.test_backdate_next_run_at(&job.id, overdue);

        let fired = engine.mark_missed_on_startup().await;
        assert_eq!(fired, 1);

        let refreshed = jobs.get(&job.id).unwrap().unwrap();
        assert_eq!(refreshed.run_count, 1);
        assert!(refreshed.next_run_at.unwrap() > Utc::now());

        // A second restart-style scan finds nothing newly due.
        let fired_again = engine.mark_missed_on_startup().await;
        assert_eq!(fired_again, 0);
    }
}
