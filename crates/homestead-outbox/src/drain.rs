use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::store::OutboxStore;
use crate::types::OutboxMessage;

/// Delivers a single outbox message to a chat transport. Implemented by the
/// Telegram channel driver; kept as a trait so the outbox crate never
/// depends on any specific transport.
#[async_trait]
pub trait OutboxTransport: Send + Sync {
    async fn deliver(&self, msg: &OutboxMessage) -> std::result::Result<(), String>;
}

/// The single drain loop for an [`OutboxStore`]. Produced by
/// [`OutboxStore::take_drainer`] and consumed by [`OutboxDrainer::run`] so a
/// second independent loop cannot be spawned from the same handle.
pub struct OutboxDrainer {
    store: Arc<OutboxStore>,
    transport: Arc<dyn OutboxTransport>,
    poll_interval: Duration,
    max_retries: u32,
}

impl OutboxDrainer {
    pub(crate) fn new(
        store: Arc<OutboxStore>,
        transport: Arc<dyn OutboxTransport>,
        poll_interval: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            transport,
            poll_interval,
            max_retries,
        }
    }

    /// Poll for pending messages until `shutdown_rx` flips to `true`.
    ///
    /// No "sending" state is persisted: a crash mid-send leaves the row
    /// `pending` and delivery retries naturally on restart. Duplicates are
    /// tolerated by the transport and bounded by `max_retries`.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut retry_counts: HashMap<i64, u32> = HashMap::new();
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("outbox drainer shutting down");
                        return;
                    }
                    continue;
                }
            }

            let batch = match self.store.claim_batch(20) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "outbox claim_batch failed");
                    continue;
                }
            };

            for msg in batch {
                match self.transport.deliver(&msg).await {
                    Ok(()) => {
                        retry_counts.remove(&msg.id);
                        if let Err(e) = self.store.mark_sent(msg.id, chrono::Utc::now()) {
                            warn!(error = %e, id = msg.id, "mark_sent failed");
                        }
                    }
                    Err(reason) => {
                        let attempts = retry_counts.entry(msg.id).or_insert(0);
                        *attempts += 1;
                        if *attempts >= self.max_retries {
                            retry_counts.remove(&msg.id);
                            if let Err(e) = self.store.mark_failed(msg.id, &reason) {
                                warn!(error = %e, id = msg.id, "mark_failed failed");
                            }
                        } else {
                            warn!(id = msg.id, attempts = *attempts, reason = %reason, "outbox delivery failed, will retry");
                        }
                    }
                }
            }
        }
    }
}
