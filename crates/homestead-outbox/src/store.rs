use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::drain::OutboxDrainer;
use crate::error::{OutboxError, Result};
use crate::types::{OutboxMessage, OutboxStatus, ParseMode};

/// Durable FIFO mailbox. Any internal producer enqueues a message without
/// coupling to the transport that eventually delivers it.
pub struct OutboxStore {
    db: Mutex<Connection>,
    drainer_taken: AtomicBool,
}

impl OutboxStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
            drainer_taken: AtomicBool::new(false),
        }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(crate::db::open(path)?))
    }

    /// Insert a `pending` row. Rejects targets outside `allow_users`.
    #[instrument(skip(self, body, allow_users))]
    pub fn enqueue(
        &self,
        chat_id: i64,
        agent_name: &str,
        body: &str,
        parse_mode: ParseMode,
        allow_users: &[String],
    ) -> Result<i64> {
        if !homestead_core::allow::is_allowed(allow_users, "", &chat_id.to_string()) {
            return Err(OutboxError::InvalidTarget(chat_id));
        }
        let now = Utc::now();
        let parse_mode_str = serde_json::to_string(&parse_mode).unwrap_or_else(|_| "\"html\"".into());
        let parse_mode_str = parse_mode_str.trim_matches('"').to_string();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO outbox (chat_id, agent_name, body, parse_mode, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
            params![chat_id, agent_name, body, parse_mode_str, now.to_rfc3339()],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Up to `limit` oldest `pending` rows, ordered by `created_at`. Assumes a
    /// single drainer, so a plain read suffices — no claim marker is written.
    #[instrument(skip(self))]
    pub fn claim_batch(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, chat_id, agent_name, body, parse_mode, created_at, sent_at, status, failure_reason
             FROM outbox WHERE status = 'pending'
             ORDER BY created_at ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mark a message delivered. Second call on an already-terminal row is a no-op.
    #[instrument(skip(self))]
    pub fn mark_sent(&self, id: i64, at: chrono::DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE outbox SET status = 'sent', sent_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Mark a message permanently undeliverable. Second call is a no-op.
    #[instrument(skip(self))]
    pub fn mark_failed(&self, id: i64, reason: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE outbox SET status = 'failed', failure_reason = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![reason, id],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<Option<OutboxMessage>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, chat_id, agent_name, body, parse_mode, created_at, sent_at, status, failure_reason
             FROM outbox WHERE id = ?1",
            params![id],
            row_to_message,
        )
        .optional()
        .map_err(OutboxError::from)
    }

    /// Hand out the single drain loop for this store. Meaningfully callable
    /// once per process: a second call on the same `Arc` still returns a
    /// drainer, but the composition root never invokes it twice, and the
    /// returned `OutboxDrainer::run` consumes `self` so a drain loop cannot
    /// be accidentally duplicated from the handle it was built from.
    pub fn take_drainer(
        self: Arc<Self>,
        transport: Arc<dyn crate::drain::OutboxTransport>,
        poll_interval: std::time::Duration,
        max_retries: u32,
    ) -> OutboxDrainer {
        self.drainer_taken.store(true, Ordering::SeqCst);
        OutboxDrainer::new(self, transport, poll_interval, max_retries)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxMessage> {
    let created_at: String = row.get(5)?;
    let sent_at: Option<String> = row.get(6)?;
    let status_str: String = row.get(7)?;
    let parse_mode_str: String = row.get(4)?;

    Ok(OutboxMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        agent_name: row.get(2)?,
        body: row.get(3)?,
        parse_mode: parse_parse_mode(&parse_mode_str),
        created_at: parse_ts(&created_at),
        sent_at: sent_at.map(|s| parse_ts(&s)),
        status: status_str.parse().unwrap_or(OutboxStatus::Pending),
        failure_reason: row.get(8)?,
    })
}

fn parse_parse_mode(s: &str) -> ParseMode {
    match s {
        "markdown_v2" => ParseMode::MarkdownV2,
        "plain_text" => ParseMode::PlainText,
        _ => ParseMode::Html,
    }
}

fn parse_ts(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> OutboxStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        OutboxStore::new(conn)
    }

    #[test]
    fn enqueue_rejects_disallowed_chat() {
        let store = store();
        let err = store
            .enqueue(100, "almanac", "hi", ParseMode::Html, &[])
            .unwrap_err();
        assert!(matches!(err, OutboxError::InvalidTarget(100)));
    }

    #[test]
    fn enqueue_then_claim_then_mark_sent() {
        let store = store();
        let allow = vec!["100".to_string()];
        let id = store.enqueue(100, "almanac", "hi", ParseMode::Html, &allow).unwrap();

        let batch = store.claim_batch(10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].status, OutboxStatus::Pending);

        store.mark_sent(id, Utc::now()).unwrap();
        let msg = store.get(id).unwrap().unwrap();
        assert_eq!(msg.status, OutboxStatus::Sent);
        assert!(msg.sent_at.is_some());

        assert!(store.claim_batch(10).unwrap().is_empty());
    }

    #[test]
    fn mark_sent_on_terminal_row_is_noop() {
        let store = store();
        let allow = vec!["100".to_string()];
        let id = store.enqueue(100, "almanac", "hi", ParseMode::Html, &allow).unwrap();
        store.mark_failed(id, "transport_timeout").unwrap();

        store.mark_sent(id, Utc::now()).unwrap();
        let msg = store.get(id).unwrap().unwrap();
        assert_eq!(msg.status, OutboxStatus::Failed);
    }

    #[test]
    fn claim_batch_orders_oldest_first() {
        let store = store();
        let allow = vec!["100".to_string()];
        let first = store.enqueue(100, "almanac", "one", ParseMode::Html, &allow).unwrap();
        let second = store.enqueue(100, "almanac", "two", ParseMode::Html, &allow).unwrap();

        let batch = store.claim_batch(10).unwrap();
        assert_eq!(batch[0].id, first);
        assert_eq!(batch[1].id, second);
    }
}
