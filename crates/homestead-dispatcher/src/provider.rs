use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::stream::StreamEvent;

/// A single message in conversation history handed to a backend.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One turn's worth of context handed to a backend. `backend_session_handle`
/// is passed through verbatim if non-empty so the backend can resume a prior
/// thread; the backend may return a new or unchanged handle in its result.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Backend-specific model identifier (`ModelBinding::backend_model`,
    /// falling back to the backend's own default when `None`).
    pub backend_model: Option<String>,
    pub system: String,
    pub messages: Vec<Message>,
    pub backend_session_handle: Option<String>,
}

/// Common interface for the two backend shapes (subprocess, HTTP). A
/// `ProviderRouter` selects one per model tag at startup.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Drive the backend to completion, emitting `StreamEvent::Delta`
    /// through `tx` zero or more times followed by exactly one
    /// `Result`/`Error`. `cancel` is observed between suspension points;
    /// preemption is best-effort.
    async fn dispatch(
        &self,
        turn: &ChatTurn,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<()>;
}
