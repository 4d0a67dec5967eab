use homestead_core::ChatId;
use homestead_dispatcher::{DispatchErrorKind, StreamEvent};
use tokio::sync::{mpsc, oneshot};

/// One user turn handed to the queue. `on_delta` receives every emitted
/// [`StreamEvent`] including the terminal `Result`/`Error`; `done` resolves
/// once the worker has finished processing (after SS has been touched on
/// success) so the caller can `await` completion without racing the stream.
pub struct Turn {
    pub chat_id: ChatId,
    pub session_name: String,
    pub user_text: String,
    pub on_delta: mpsc::Sender<StreamEvent>,
    pub done: oneshot::Sender<TurnOutcome>,
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed,
    Failed { kind: DispatchErrorKind, message: String },
}
