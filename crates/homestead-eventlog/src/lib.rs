//! `homestead-eventlog` — the EL component. An append-only structured event
//! log backed by SQLite, plus a `tracing_subscriber::Layer` that mirrors every
//! `tracing` event into the same store.

pub mod db;
pub mod error;
pub mod layer;
pub mod store;
pub mod types;

pub use error::{EventLogError, Result};
pub use layer::EventLogLayer;
pub use store::EventLogStore;
pub use types::{EventLogQuery, LogLevel, LogRecord, NewLogRecord};
