use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use homestead_core::ChatId;
use homestead_dispatcher::{ChatTurn, Message, ProviderRouter, Role, StreamEvent};
use homestead_sessions::SessionManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use crate::types::{Turn, TurnOutcome};

/// Owns the receiving half of one chat's turn channel. Processes turns
/// strictly one at a time, in FIFO order; exits (and is torn down) once its
/// channel is dropped and drained.
pub struct PerChatWorker {
    pub(crate) chat_id: ChatId,
    pub(crate) rx: mpsc::Receiver<Turn>,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) router: Arc<ProviderRouter>,
    pub(crate) backend_models: Arc<HashMap<String, Option<String>>>,
    pub(crate) active_cancel: Arc<DashMap<ChatId, CancellationToken>>,
    pub(crate) turn_timeout: Duration,
}

impl PerChatWorker {
    pub async fn run(mut self) {
        while let Some(turn) = self.rx.recv().await {
            self.process_one(turn).await;
            self.active_cancel.remove(&self.chat_id);
        }
    }

    #[instrument(skip(self, turn), fields(chat_id = self.chat_id.0, session = %turn.session_name))]
    async fn process_one(&self, turn: Turn) {
        let cancel = CancellationToken::new();
        self.active_cancel.insert(self.chat_id, cancel.clone());

        let outcome = self.dispatch(&turn, cancel).await;

        match &outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::Failed { kind, message } => {
                warn!(kind = kind.as_str(), message, "turn failed");
            }
        }
        let _ = turn.done.send(outcome);
    }

    async fn dispatch(&self, turn: &Turn, cancel: CancellationToken) -> TurnOutcome {
        let session = match self.sessions.get(turn.chat_id.0, &turn.session_name) {
            Ok(Some(session)) => session,
            Ok(None) => {
                return TurnOutcome::Failed {
                    kind: homestead_dispatcher::DispatchErrorKind::Config,
                    message: format!("session not found: {}", turn.session_name),
                };
            }
            Err(e) => {
                error!(error = %e, "session lookup failed");
                return TurnOutcome::Failed {
                    kind: homestead_dispatcher::DispatchErrorKind::Backend,
                    message: e.to_string(),
                };
            }
        };

        let backend_model = self.backend_models.get(&session.model).cloned().flatten();
        let chat_turn = ChatTurn {
            backend_model,
            system: String::new(),
            messages: vec![Message {
                role: Role::User,
                content: turn.user_text.clone(),
            }],
            backend_session_handle: session.backend_session_handle.clone(),
        };

        let (tx, mut rx) = mpsc::channel(32);
        let forward_on_delta = turn.on_delta.clone();
        let forward = tokio::spawn(async move {
            let mut final_event = None;
            while let Some(event) = rx.recv().await {
                if matches!(event, StreamEvent::Result { .. } | StreamEvent::Error { .. }) {
                    final_event = Some(event.clone());
                }
                let _ = forward_on_delta.send(event).await;
            }
            final_event
        });

        let dispatch_result = self
            .router
            .dispatch(&session.model, &chat_turn, tx, cancel, self.turn_timeout)
            .await;

        let final_event = forward.await.ok().flatten();

        match dispatch_result {
            Ok(()) => {
                if let Some(StreamEvent::Result { new_handle, .. }) = final_event {
                    if let Err(e) = self.sessions.touch(turn.chat_id.0, &turn.session_name, new_handle.as_deref()) {
                        error!(error = %e, "session touch failed after successful turn");
                    }
                }
                TurnOutcome::Completed
            }
            Err(e) => TurnOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}
