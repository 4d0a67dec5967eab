//! `homestead-dispatcher` — the MD component. Given a session and a user
//! turn, drives the bound model backend to completion while streaming
//! incremental output through the delta/result/error contract.

pub mod claude_cli;
pub mod error;
pub mod http_chat;
pub mod provider;
pub mod router;
pub mod stream;

pub use claude_cli::ClaudeCliProvider;
pub use error::{DispatchError, DispatchErrorKind, Result};
pub use http_chat::HttpChatProvider;
pub use provider::{ChatTurn, Message, ModelBackend, Role};
pub use router::ProviderRouter;
pub use stream::StreamEvent;
