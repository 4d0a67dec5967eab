use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::types::{Blocker, BlockerKind, NewTask, Task, TaskPriority, TaskStatus};

/// CRUD store for [`Task`]s and their [`Blocker`]s.
///
/// Consumed only by the HTTP API — the core never creates tasks on its own
/// initiative.
pub struct TaskStore {
    db: std::sync::Mutex<Connection>,
}

impl TaskStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: std::sync::Mutex::new(conn),
        }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(crate::db::open(path)?))
    }

    #[instrument(skip(self, new_task))]
    pub fn create(&self, new_task: NewTask) -> Result<Task> {
        if new_task.title.trim().is_empty() {
            return Err(TaskError::Validation("title must not be empty".into()));
        }
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let priority = new_task.priority.unwrap_or(TaskPriority::Normal);
        let tags_json = serde_json::to_string(&new_task.tags).unwrap_or_else(|_| "[]".into());

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO tasks
             (id, title, description, status, priority, assignee, dependent_ids, tags, notes, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5, '[]', ?6, '', ?7, ?8, ?8)",
            params![
                id,
                new_task.title,
                new_task.description,
                priority.as_str(),
                new_task.assignee,
                tags_json,
                new_task.source,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Task {
            id,
            title: new_task.title,
            description: new_task.description,
            status: TaskStatus::Pending,
            priority,
            assignee: new_task.assignee,
            blockers: Vec::new(),
            dependent_ids: Vec::new(),
            tags: new_task.tags,
            notes: String::new(),
            source: new_task.source,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: &str) -> Result<Option<Task>> {
        let db = self.db.lock().unwrap();
        let task = db
            .query_row(
                "SELECT id, title, description, status, priority, assignee,
                        dependent_ids, tags, notes, source, created_at, updated_at, completed_at
                 FROM tasks WHERE id = ?1",
                params![id],
                row_to_task,
            )
            .optional()?;
        let Some(mut task) = task else { return Ok(None) };
        task.blockers = self.blockers_for(&db, id)?;
        Ok(Some(task))
    }

    #[instrument(skip(self))]
    pub fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let db = self.db.lock().unwrap();
        let mut sql = String::from(
            "SELECT id, title, description, status, priority, assignee,
                    dependent_ids, tags, notes, source, created_at, updated_at, completed_at
             FROM tasks",
        );
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = db.prepare(&sql)?;
        let mut tasks: Vec<Task> = if let Some(status) = status {
            stmt.query_map(params![status.as_str()], row_to_task)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], row_to_task)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        for task in &mut tasks {
            task.blockers = self.blockers_for(&db, &task.id)?;
        }
        Ok(tasks)
    }

    /// Set a task's status directly. Setting `completed` stamps `completed_at`;
    /// any other status clears it. Prefer [`TaskStore::add_blocker`] /
    /// [`TaskStore::resolve_blocker`] to drive the `blocked` state — those
    /// enforce the blocker-count invariant; this method does not.
    #[instrument(skip(self))]
    pub fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        let now = Utc::now();
        let completed_at = if status == TaskStatus::Completed {
            Some(now.to_rfc3339())
        } else {
            None
        };
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2, completed_at = ?3 WHERE id = ?4",
            params![status.as_str(), now.to_rfc3339(), completed_at, id],
        )?;
        if rows == 0 {
            return Err(TaskError::NotFound(id.to_string()));
        }
        self.get_locked(&db, id)
    }

    /// Add a blocker. Any unresolved blocker forces the task into `blocked`.
    #[instrument(skip(self, description))]
    pub fn add_blocker(&self, task_id: &str, kind: BlockerKind, description: &str) -> Result<Task> {
        let now = Utc::now();
        let blocker_id = Uuid::new_v4().to_string();
        let db = self.db.lock().unwrap();

        if self.get_locked(&db, task_id).is_err() {
            return Err(TaskError::NotFound(task_id.to_string()));
        }

        db.execute(
            "INSERT INTO blockers (id, task_id, kind, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![blocker_id, task_id, kind.as_str(), description, now.to_rfc3339()],
        )?;
        db.execute(
            "UPDATE tasks SET status = 'blocked', updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), task_id],
        )?;
        self.get_locked(&db, task_id)
    }

    /// Resolve a blocker. If it was the last unresolved blocker on a `blocked`
    /// task, the task returns to `pending`.
    #[instrument(skip(self, resolution))]
    pub fn resolve_blocker(
        &self,
        task_id: &str,
        blocker_id: &str,
        resolved_by: &str,
        resolution: &str,
    ) -> Result<Task> {
        let now = Utc::now();
        let db = self.db.lock().unwrap();

        let rows = db.execute(
            "UPDATE blockers SET resolved_at = ?1, resolved_by = ?2, resolution = ?3
             WHERE id = ?4 AND task_id = ?5 AND resolved_at IS NULL",
            params![now.to_rfc3339(), resolved_by, resolution, blocker_id, task_id],
        )?;
        if rows == 0 {
            return Err(TaskError::BlockerNotFound(blocker_id.to_string()));
        }

        let remaining: i64 = db.query_row(
            "SELECT COUNT(*) FROM blockers WHERE task_id = ?1 AND resolved_at IS NULL",
            params![task_id],
            |row| row.get(0),
        )?;

        if remaining == 0 {
            let status: String = db.query_row(
                "SELECT status FROM tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )?;
            if status == "blocked" {
                db.execute(
                    "UPDATE tasks SET status = 'pending', updated_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), task_id],
                )?;
            }
        }

        self.get_locked(&db, task_id)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(TaskError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn blockers_for(&self, db: &Connection, task_id: &str) -> Result<Vec<Blocker>> {
        let mut stmt = db.prepare(
            "SELECT id, kind, description, created_at, resolved_at, resolved_by, resolution
             FROM blockers WHERE task_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![task_id], row_to_blocker)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_locked(&self, db: &Connection, id: &str) -> Result<Task> {
        let mut task = db
            .query_row(
                "SELECT id, title, description, status, priority, assignee,
                        dependent_ids, tags, notes, source, created_at, updated_at, completed_at
                 FROM tasks WHERE id = ?1",
                params![id],
                row_to_task,
            )
            .optional()?
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        task.blockers = self.blockers_for(db, id)?;
        Ok(task)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get(3)?;
    let priority_str: String = row.get(4)?;
    let dependent_ids_json: String = row.get(6)?;
    let tags_json: String = row.get(7)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    let completed_at: Option<String> = row.get(12)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: status_str.parse().unwrap_or(TaskStatus::Pending),
        priority: priority_str.parse().unwrap_or(TaskPriority::Normal),
        assignee: row.get(5)?,
        blockers: Vec::new(),
        dependent_ids: serde_json::from_str(&dependent_ids_json).unwrap_or_default(),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        notes: row.get(8)?,
        source: row.get(9)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        completed_at: completed_at.map(|s| parse_ts(&s)),
    })
}

fn row_to_blocker(row: &rusqlite::Row<'_>) -> rusqlite::Result<Blocker> {
    let kind_str: String = row.get(1)?;
    let created_at: String = row.get(3)?;
    let resolved_at: Option<String> = row.get(4)?;

    Ok(Blocker {
        id: row.get(0)?,
        kind: kind_str.parse().unwrap_or(BlockerKind::Dependency),
        description: row.get(2)?,
        created_at: parse_ts(&created_at),
        resolved_at: resolved_at.map(|s| parse_ts(&s)),
        resolved_by: row.get(5)?,
        resolution: row.get(6)?,
    })
}

fn parse_ts(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TaskStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        TaskStore::new(conn)
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn create_defaults_to_pending_normal_priority() {
        let store = store();
        let task = store.create(new_task("write tests")).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Normal);
        assert!(task.blockers.is_empty());
    }

    #[test]
    fn create_rejects_empty_title() {
        let store = store();
        assert!(store.create(new_task("   ")).is_err());
    }

    #[test]
    fn adding_blocker_moves_task_to_blocked() {
        let store = store();
        let task = store.create(new_task("ship it")).unwrap();
        let blocked = store
            .add_blocker(&task.id, BlockerKind::HumanApproval, "needs sign-off")
            .unwrap();
        assert_eq!(blocked.status, TaskStatus::Blocked);
        assert_eq!(blocked.blockers.len(), 1);
    }

    #[test]
    fn resolving_last_blocker_returns_to_pending() {
        let store = store();
        let task = store.create(new_task("ship it")).unwrap();
        let blocked = store
            .add_blocker(&task.id, BlockerKind::HumanApproval, "needs sign-off")
            .unwrap();
        let blocker_id = blocked.blockers[0].id.clone();

        let resolved = store
            .resolve_blocker(&task.id, &blocker_id, "alice", "approved")
            .unwrap();
        assert_eq!(resolved.status, TaskStatus::Pending);
        assert!(resolved.blockers[0].is_resolved());
    }

    #[test]
    fn resolving_one_of_two_blockers_stays_blocked() {
        let store = store();
        let task = store.create(new_task("ship it")).unwrap();
        let blocked = store
            .add_blocker(&task.id, BlockerKind::HumanApproval, "sign-off")
            .unwrap();
        let blocked = store
            .add_blocker(&blocked.id, BlockerKind::Dependency, "waiting on #2")
            .unwrap();
        let first_id = blocked.blockers[0].id.clone();

        let still_blocked = store
            .resolve_blocker(&task.id, &first_id, "alice", "ok")
            .unwrap();
        assert_eq!(still_blocked.status, TaskStatus::Blocked);
    }

    #[test]
    fn completing_task_sets_completed_at() {
        let store = store();
        let task = store.create(new_task("ship it")).unwrap();
        let completed = store.set_status(&task.id, TaskStatus::Completed).unwrap();
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn list_filters_by_status() {
        let store = store();
        store.create(new_task("a")).unwrap();
        let b = store.create(new_task("b")).unwrap();
        store.set_status(&b.id, TaskStatus::Completed).unwrap();

        let pending = store.list(Some(TaskStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "a");
    }

    #[test]
    fn delete_missing_task_errors() {
        let store = store();
        assert!(store.delete("ghost").is_err());
    }
}
