use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::error::{DispatchError, Result};
use crate::provider::{ChatTurn, ModelBackend};
use crate::stream::StreamEvent;

/// Maps each configured model tag to its bound backend, constructed once at
/// startup from config. A thin selection layer: each tag is bound to
/// exactly one backend, so there is no cross-backend failover to implement.
pub struct ProviderRouter {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    pub fn bind(&mut self, model_tag: impl Into<String>, backend: Arc<dyn ModelBackend>) {
        self.backends.insert(model_tag.into(), backend);
    }

    /// Drive `turn` to completion against the backend bound to `model_tag`,
    /// enforcing the per-turn timeout and forwarding deltas through `tx`.
    /// On timeout the backend is cancelled and `StreamEvent::Error` is sent
    /// with kind `timeout`; session state is left untouched by the caller.
    #[instrument(skip(self, turn, tx, cancel))]
    pub async fn dispatch(
        &self,
        model_tag: &str,
        turn: &ChatTurn,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Result<()> {
        let backend = self
            .backends
            .get(model_tag)
            .cloned()
            .ok_or_else(|| DispatchError::Config(format!("unknown model tag: {model_tag}")))?;

        let child_cancel = cancel.child_token();
        let run = backend.dispatch(turn, tx.clone(), child_cancel.clone());

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(())) => {
                info!(model_tag, backend = backend.name(), "dispatch completed");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                child_cancel.cancel();
                let err = DispatchError::Timeout(timeout.as_secs());
                error!(model_tag, "dispatch timed out");
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: err.kind(),
                        message: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoBackend;

    #[async_trait]
    impl ModelBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn dispatch(
            &self,
            turn: &ChatTurn,
            tx: mpsc::Sender<StreamEvent>,
            _cancel: CancellationToken,
        ) -> Result<()> {
            let text = turn.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let _ = tx.send(StreamEvent::Delta { text: text.clone() }).await;
            let _ = tx
                .send(StreamEvent::Result {
                    text,
                    new_handle: Some("h-1".to_string()),
                    tokens_in: 1,
                    tokens_out: 1,
                })
                .await;
            Ok(())
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl ModelBackend for HangingBackend {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn dispatch(
            &self,
            _turn: &ChatTurn,
            _tx: mpsc::Sender<StreamEvent>,
            cancel: CancellationToken,
        ) -> Result<()> {
            cancel.cancelled().await;
            Err(DispatchError::Cancelled)
        }
    }

    fn turn(text: &str) -> ChatTurn {
        ChatTurn {
            backend_model: None,
            system: String::new(),
            messages: vec![crate::provider::Message {
                role: crate::provider::Role::User,
                content: text.to_string(),
            }],
            backend_session_handle: None,
        }
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_model_tag() {
        let router = ProviderRouter::new();
        let (tx, _rx) = mpsc::channel(8);
        let result = router
            .dispatch("ghost-tag", &turn("hi"), tx, CancellationToken::new(), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(DispatchError::Config(_))));
    }

    #[tokio::test]
    async fn dispatch_forwards_backend_result() {
        let mut router = ProviderRouter::new();
        router.bind("echo-tag", Arc::new(EchoBackend));
        let (tx, mut rx) = mpsc::channel(8);
        router
            .dispatch("echo-tag", &turn("hello"), tx, CancellationToken::new(), Duration::from_secs(5))
            .await
            .unwrap();

        let mut saw_result = false;
        while let Some(event) = rx.recv().await {
            if let StreamEvent::Result { text, .. } = event {
                assert_eq!(text, "hello");
                saw_result = true;
            }
        }
        assert!(saw_result);
    }

    #[tokio::test]
    async fn dispatch_times_out_and_cancels() {
        let mut router = ProviderRouter::new();
        router.bind("slow-tag", Arc::new(HangingBackend));
        let (tx, _rx) = mpsc::channel(8);
        let result = router
            .dispatch("slow-tag", &turn("hi"), tx, CancellationToken::new(), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout(_))));
    }
}
