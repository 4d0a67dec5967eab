use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::schedule::compute_next_run;
use crate::types::{Action, Job, NewJob, Schedule};

/// CRUD store for [`Job`]s, plus the atomic fire transition the scheduler
/// engine and the manual `run_now` API path both use.
pub struct JobStore {
    db: Mutex<Connection>,
}

impl JobStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(crate::db::open(path)?))
    }

    #[instrument(skip(self, new_job))]
    pub fn create(&self, new_job: NewJob) -> Result<Job> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let next_run_at = compute_next_run(&new_job.schedule, now);
        let action_config = serde_json::to_string(&new_job.action)?;
        let tags_json = serde_json::to_string(&new_job.tags).unwrap_or_else(|_| "[]".into());

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO jobs
             (id, name, description, schedule_kind, schedule_expression, action_kind, action_config,
              enabled, last_run_at, next_run_at, run_count, created_at, tags, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, NULL, ?8, 0, ?9, ?10, ?11)",
            params![
                id,
                new_job.name,
                new_job.description,
                new_job.schedule.kind_str(),
                new_job.schedule.expression_str(),
                new_job.action.kind().as_str(),
                action_config,
                next_run_at.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
                tags_json,
                new_job.source,
            ],
        )?;

        Ok(Job {
            id,
            name: new_job.name,
            description: new_job.description,
            schedule: new_job.schedule,
            action: new_job.action,
            enabled: true,
            last_run_at: None,
            next_run_at,
            run_count: 0,
            created_at: now,
            tags: new_job.tags,
            source: new_job.source,
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        let db = self.db.lock().unwrap();
        db.query_row(SELECT_JOB, params![id], row_to_job)
            .optional()?
            .transpose()
    }

    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!("{SELECT_JOB_BASE} ORDER BY created_at DESC"))?;
        let rows: Vec<Job> = stmt
            .query_map([], row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Jobs due to fire: enabled, with a `next_run_at` at or before `now`.
    #[instrument(skip(self))]
    pub fn due(&self, now: chrono::DateTime<Utc>) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{SELECT_JOB_BASE} WHERE enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?1
             ORDER BY next_run_at ASC"
        ))?;
        let rows: Vec<Job> = stmt
            .query_map(params![now.to_rfc3339()], row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Atomically record a fire: `run_count += 1`, `last_run_at = now`,
    /// `next_run_at = compute(schedule, now)`. Action dispatch happens
    /// separately and does not roll this transition back on failure.
    #[instrument(skip(self))]
    pub fn record_fire(&self, id: &str, now: chrono::DateTime<Utc>) -> Result<Job> {
        let db = self.db.lock().unwrap();
        let job = db
            .query_row(SELECT_JOB, params![id], row_to_job)
            .optional()?
            .transpose()?
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        let next_run_at = compute_next_run(&job.schedule, now);
        db.execute(
            "UPDATE jobs SET run_count = run_count + 1, last_run_at = ?1, next_run_at = ?2 WHERE id = ?3",
            params![now.to_rfc3339(), next_run_at.map(|t| t.to_rfc3339()), id],
        )?;

        Ok(Job {
            last_run_at: Some(now),
            next_run_at,
            run_count: job.run_count + 1,
            ..job
        })
    }

    /// Test-only: backdate `next_run_at` to simulate a job that was already
    /// overdue when the process went offline, without waiting real time.
    #[cfg(test)]
    pub(crate) fn test_backdate_next_run_at(&self, id: &str, at: chrono::DateTime<Utc>) {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE jobs SET next_run_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )
        .unwrap();
    }

    #[instrument(skip(self))]
    pub fn enable(&self, id: &str) -> Result<Job> {
        let now = Utc::now();
        let db = self.db.lock().unwrap();
        let job = db
            .query_row(SELECT_JOB, params![id], row_to_job)
            .optional()?
            .transpose()?
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        let next_run_at = compute_next_run(&job.schedule, now);
        db.execute(
            "UPDATE jobs SET enabled = 1, next_run_at = ?1 WHERE id = ?2",
            params![next_run_at.map(|t| t.to_rfc3339()), id],
        )?;
        Ok(Job {
            enabled: true,
            next_run_at,
            ..job
        })
    }

    /// Disable a job, clearing `next_run_at` and stopping further fires
    /// without removing history.
    #[instrument(skip(self))]
    pub fn disable(&self, id: &str) -> Result<Job> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE jobs SET enabled = 0, next_run_at = NULL WHERE id = ?1",
            params![id],
        )?;
        if rows == 0 {
            return Err(SchedulerError::NotFound(id.to_string()));
        }
        db.query_row(SELECT_JOB, params![id], row_to_job)
            .optional()?
            .transpose()?
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(SchedulerError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

const SELECT_JOB_BASE: &str = "SELECT id, name, description, schedule_kind, schedule_expression,
           action_kind, action_config, enabled, last_run_at, next_run_at, run_count,
           created_at, tags, source
    FROM jobs";

const SELECT_JOB: &str = "SELECT id, name, description, schedule_kind, schedule_expression,
           action_kind, action_config, enabled, last_run_at, next_run_at, run_count,
           created_at, tags, source
    FROM jobs WHERE id = ?1";

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Job>> {
    let schedule_kind: String = row.get(3)?;
    let schedule_expression: String = row.get(4)?;
    let action_config_json: String = row.get(6)?;
    let enabled: i64 = row.get(7)?;
    let last_run_at: Option<String> = row.get(8)?;
    let next_run_at: Option<String> = row.get(9)?;
    let created_at: String = row.get(11)?;
    let tags_json: String = row.get(12)?;

    let built = (|| -> Result<Job> {
        let schedule = Schedule::parse_and_validate(&schedule_kind, &schedule_expression)?;
        let action: Action = serde_json::from_str(&action_config_json)?;
        Ok(Job {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            schedule,
            action,
            enabled: enabled != 0,
            last_run_at: last_run_at.map(|s| parse_ts(&s)),
            next_run_at: next_run_at.map(|s| parse_ts(&s)),
            run_count: row.get::<_, i64>(10)? as u64,
            created_at: parse_ts(&created_at),
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            source: row.get(13)?,
        })
    })();
    Ok(built)
}

fn parse_ts(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutboxActionConfig;

    fn store() -> JobStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        JobStore::new(conn)
    }

    fn outbox_job(name: &str, schedule: Schedule) -> NewJob {
        NewJob {
            name: name.to_string(),
            description: String::new(),
            schedule,
            action: Action::Outbox(OutboxActionConfig {
                chat_id: 100,
                agent_name: "almanac".to_string(),
                message: "morning".to_string(),
            }),
            tags: Vec::new(),
            source: None,
        }
    }

    #[test]
    fn create_computes_next_run_at() {
        let store = store();
        let job = store
            .create(outbox_job("heartbeat", Schedule::Interval { every_secs: 60 }))
            .unwrap();
        assert!(job.next_run_at.is_some());
        assert!(job.next_run_at.unwrap() > job.created_at);
    }

    #[test]
    fn record_fire_advances_next_run_at_into_future() {
        let store = store();
        let job = store
            .create(outbox_job("heartbeat", Schedule::Interval { every_secs: 60 }))
            .unwrap();
        let now = Utc::now();
        let fired = store.record_fire(&job.id, now).unwrap();
        assert_eq!(fired.run_count, 1);
        assert!(fired.next_run_at.unwrap() > now);
    }

    #[test]
    fn once_job_clears_next_run_at_after_fire() {
        let store = store();
        let at = Utc::now() + chrono::Duration::seconds(1);
        let job = store
            .create(outbox_job("one-shot", Schedule::Once { at }))
            .unwrap();
        let fired = store
            .record_fire(&job.id, at + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(fired.run_count, 1);
        assert!(fired.next_run_at.is_none());
        assert!(fired.enabled);
    }

    #[test]
    fn disable_clears_next_run_at() {
        let store = store();
        let job = store
            .create(outbox_job("heartbeat", Schedule::Interval { every_secs: 60 }))
            .unwrap();
        let disabled = store.disable(&job.id).unwrap();
        assert!(!disabled.enabled);
        assert!(disabled.next_run_at.is_none());
    }

    #[test]
    fn due_excludes_disabled_jobs() {
        let store = store();
        let job = store
            .create(outbox_job("heartbeat", Schedule::Interval { every_secs: 1 }))
            .unwrap();
        store.disable(&job.id).unwrap();
        let due = store.due(Utc::now() + chrono::Duration::seconds(5)).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn delete_missing_job_errors() {
        let store = store();
        assert!(store.delete("ghost").is_err());
    }
}
