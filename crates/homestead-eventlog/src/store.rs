use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{EventLogError, Result};
use crate::types::{EventLogQuery, LogLevel, LogRecord, NewLogRecord};

/// Append-only structured event log, backed by a single SQLite file.
pub struct EventLogStore {
    conn: Mutex<Connection>,
}

impl EventLogStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(crate::db::open(path)?))
    }

    /// Insert a new record, stamping it with the current time.
    pub fn append(&self, record: NewLogRecord) -> Result<LogRecord> {
        let conn = self.conn.lock().unwrap();
        let timestamp = Utc::now();
        let payload_json = record
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| EventLogError::InvalidQuery(e.to_string()))?;

        conn.execute(
            "INSERT INTO log_records (timestamp, level, source, message, payload, session_id, chat_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                timestamp.to_rfc3339(),
                record.level.as_str(),
                record.source,
                record.message,
                payload_json,
                record.session_id,
                record.chat_id,
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(LogRecord {
            id,
            timestamp,
            level: record.level,
            source: record.source,
            message: record.message,
            payload: record.payload,
            session_id: record.session_id,
            chat_id: record.chat_id,
        })
    }

    /// Query records matching the given filters, newest first.
    pub fn query(&self, query: &EventLogQuery) -> Result<Vec<LogRecord>> {
        let limit = if query.limit == 0 {
            EventLogQuery::MAX_LIMIT
        } else {
            query.limit.min(EventLogQuery::MAX_LIMIT)
        };

        let mut sql = String::from(
            "SELECT id, timestamp, level, source, message, payload, session_id, chat_id
             FROM log_records WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(since) = query.since {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(since.to_rfc3339()));
        }
        if let Some(until) = query.until {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(until.to_rfc3339()));
        }
        if let Some(level) = query.level {
            sql.push_str(" AND level = ?");
            args.push(Box::new(level.as_str()));
        }
        if let Some(prefix) = &query.source_prefix {
            sql.push_str(" AND source LIKE ? ESCAPE '\\'");
            args.push(Box::new(format!("{}%", escape_like(prefix))));
        }
        if let Some(substring) = &query.substring {
            sql.push_str(" AND message LIKE ? ESCAPE '\\'");
            args.push(Box::new(format!("%{}%", escape_like(substring))));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count of records per `{source → {level → count}}` within an optional
    /// time window — used for the dashboard summary panel to compare, e.g.,
    /// `md` vs `ss` ERROR volume rather than a single merged-across-sources
    /// count.
    pub fn summary(
        &self,
        since: Option<chrono::DateTime<Utc>>,
    ) -> Result<HashMap<String, HashMap<LogLevel, i64>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source, level, COUNT(*) FROM log_records
             WHERE timestamp >= ?1 GROUP BY source, level",
        )?;
        let since = since.unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        let rows = stmt
            .query_map(params![since.to_rfc3339()], |row| {
                let source: String = row.get(0)?;
                let level: String = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok((source, level, count))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut by_source: HashMap<String, HashMap<LogLevel, i64>> = HashMap::new();
        for (source, level, count) in rows {
            let level = level.parse::<LogLevel>().map_err(EventLogError::InvalidQuery)?;
            by_source.entry(source).or_default().insert(level, count);
        }
        Ok(by_source)
    }

    /// Fetch a single record by id, used by the dashboard detail view.
    pub fn get(&self, id: i64) -> Result<Option<LogRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, timestamp, level, source, message, payload, session_id, chat_id
             FROM log_records WHERE id = ?1",
            params![id],
            row_to_record,
        )
        .optional()
        .map_err(EventLogError::from)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogRecord> {
    let level_str: String = row.get(2)?;
    let ts_str: String = row.get(1)?;
    let payload_str: Option<String> = row.get(5)?;

    let level = level_str.parse::<LogLevel>().unwrap_or(LogLevel::Info);
    let timestamp = chrono::DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let payload = payload_str.and_then(|s| serde_json::from_str(&s).ok());

    Ok(LogRecord {
        id: row.get(0)?,
        timestamp,
        level,
        source: row.get(3)?,
        message: row.get(4)?,
        payload,
        session_id: row.get(6)?,
        chat_id: row.get(7)?,
    })
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EventLogStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        EventLogStore::new(conn)
    }

    fn rec(level: LogLevel, source: &str, message: &str) -> NewLogRecord {
        NewLogRecord {
            level,
            source: source.to_string(),
            message: message.to_string(),
            payload: None,
            session_id: None,
            chat_id: None,
        }
    }

    #[test]
    fn append_assigns_id_and_timestamp() {
        let store = store();
        let r = store.append(rec(LogLevel::Info, "md", "dispatch ok")).unwrap();
        assert_eq!(r.id, 1);
        assert_eq!(r.source, "md");
    }

    #[test]
    fn query_filters_by_level() {
        let store = store();
        store.append(rec(LogLevel::Info, "md", "ok")).unwrap();
        store.append(rec(LogLevel::Error, "md", "boom")).unwrap();

        let results = store
            .query(&EventLogQuery {
                level: Some(LogLevel::Error),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "boom");
    }

    #[test]
    fn query_filters_by_source_prefix() {
        let store = store();
        store.append(rec(LogLevel::Info, "md.claude", "a")).unwrap();
        store.append(rec(LogLevel::Info, "ss", "b")).unwrap();

        let results = store
            .query(&EventLogQuery {
                source_prefix: Some("md".to_string()),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "md.claude");
    }

    #[test]
    fn query_limit_is_capped() {
        let store = store();
        for i in 0..5 {
            store.append(rec(LogLevel::Info, "md", &format!("msg {i}"))).unwrap();
        }
        let results = store
            .query(&EventLogQuery {
                limit: EventLogQuery::MAX_LIMIT + 100,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn summary_counts_by_source_and_level() {
        let store = store();
        store.append(rec(LogLevel::Info, "md", "a")).unwrap();
        store.append(rec(LogLevel::Info, "md", "b")).unwrap();
        store.append(rec(LogLevel::Warning, "md", "c")).unwrap();
        store.append(rec(LogLevel::Error, "ss", "d")).unwrap();

        let counts = store.summary(None).unwrap();
        assert_eq!(counts["md"][&LogLevel::Info], 2);
        assert_eq!(counts["md"][&LogLevel::Warning], 1);
        assert_eq!(counts["ss"][&LogLevel::Error], 1);
        assert!(!counts["md"].contains_key(&LogLevel::Error));
    }
}
