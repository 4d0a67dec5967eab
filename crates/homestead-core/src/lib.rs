//! `homestead-core` — shared configuration, error taxonomy, and identifiers
//! used by every other crate in the workspace.

pub mod allow;
pub mod config;
pub mod error;
pub mod ids;

pub use config::HomesteadConfig;
pub use error::{HomesteadError, Result};
pub use ids::ChatId;
