//! The web channel driver's WebSocket streaming protocol: client sends
//! `{session_name, chat_id, message}`; the server forwards every delta
//! verbatim, tagged, followed by exactly one `result`/`error` frame.
//!
//! One task per connection, splitting the socket into independent send/recv
//! halves so streamed deltas don't block on the next inbound frame.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use homestead_dispatcher::StreamEvent;
use homestead_turnqueue::{Turn, TurnOutcome};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    session_name: String,
    chat_id: i64,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundFrame<'a> {
    Delta { text: &'a str },
    Result { text: &'a str, session_handle: Option<&'a str> },
    Error { message: &'a str },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    if !auth::check_ws_token(&state, q.token.as_deref()) {
        return (axum::http::StatusCode::UNAUTHORIZED, "missing or invalid token").into_response();
    }
    ws.on_upgrade(|socket| handle_connection(socket, state)).into_response()
}

/// Per-connection task. Each inbound text frame is one turn; turns are
/// serialized per chat by the shared [`homestead_turnqueue::TurnQueue`], so
/// a client hammering the same chat sees the same backpressure a Telegram
/// user would.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();
    info!("new web WS connection");

    while let Some(Ok(msg)) = rx.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        let inbound: InboundMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                let frame = OutboundFrame::Error {
                    message: &format!("malformed frame: {e}"),
                };
                if send_json(&mut tx, &frame).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if run_turn(&state, &mut tx, inbound).await.is_err() {
            break;
        }
    }

    info!("web WS connection closed");
}

async fn run_turn(
    state: &Arc<AppState>,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    inbound: InboundMessage,
) -> Result<(), axum::Error> {
    let (delta_tx, mut delta_rx) = mpsc::channel::<StreamEvent>(64);
    let (done_tx, done_rx) = oneshot::channel();

    let turn = Turn {
        chat_id: homestead_core::ChatId(inbound.chat_id),
        session_name: inbound.session_name,
        user_text: inbound.message,
        on_delta: delta_tx,
        done: done_tx,
    };

    if state.turn_queue.enqueue(turn).is_err() {
        let frame = OutboundFrame::Error {
            message: "still working on your previous message in this chat",
        };
        return send_json(tx, &frame).await;
    }

    while let Some(event) = delta_rx.recv().await {
        match event {
            StreamEvent::Delta { text } => {
                send_json(tx, &OutboundFrame::Delta { text: &text }).await?;
            }
            StreamEvent::Result { text, new_handle, .. } => {
                send_json(
                    tx,
                    &OutboundFrame::Result {
                        text: &text,
                        session_handle: new_handle.as_deref(),
                    },
                )
                .await?;
            }
            StreamEvent::Error { message, .. } => {
                send_json(tx, &OutboundFrame::Error { message: &message }).await?;
            }
        }
    }

    match done_rx.await {
        Ok(TurnOutcome::Completed) => {}
        Ok(TurnOutcome::Failed { message, .. }) => {
            warn!(message, "web turn failed");
        }
        Err(_) => {
            warn!("web turn worker dropped without sending an outcome");
        }
    }
    Ok(())
}

async fn send_json<T: Serialize>(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await
}
