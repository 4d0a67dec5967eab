use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{DispatchError, Result};
use crate::provider::{ChatTurn, ModelBackend, Role};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

/// HTTP REST backend for OpenAI-compatible chat-completions APIs (bound to
/// the `xai-grok` tag). POSTs with `stream: true` and parses the SSE byte
/// stream, generalizing the Anthropic `content_block_delta` line-buffering
/// pattern to the `choices[0].delta.content` shape.
pub struct HttpChatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpChatProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ModelBackend for HttpChatProvider {
    fn name(&self) -> &str {
        "http-chat"
    }

    async fn dispatch(
        &self,
        turn: &ChatTurn,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(DispatchError::Config("missing HTTP backend credential".to_string()));
        }

        let model = turn.backend_model.clone().unwrap_or_else(|| "grok-2-latest".to_string());
        let mut messages = Vec::with_capacity(turn.messages.len() + 1);
        if !turn.system.is_empty() {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: turn.system.clone(),
            });
        }
        for m in &turn.messages {
            messages.push(WireMessage {
                role: match m.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            });
        }

        let body = WireRequest {
            model,
            messages,
            stream: true,
        };

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = tokio::select! {
            r = self.client.post(&url).bearer_auth(&self.api_key).json(&body).send() => {
                r.map_err(|e| DispatchError::Transport(e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let err = DispatchError::Backend(format!("HTTP {status}: {text}"));
            let _ = tx.send(StreamEvent::Error { kind: err.kind(), message: err.to_string() }).await;
            return Err(err);
        }

        process_stream(resp, tx.clone(), cancel).await
    }
}

#[derive(serde::Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(serde::Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

async fn process_stream(
    resp: reqwest::Response,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut line_buf = String::new();
    let mut accumulated = String::new();
    let mut model = String::new();
    let mut stream_body = resp.bytes_stream();

    loop {
        let chunk = tokio::select! {
            c = stream_body.next() => c,
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(|e| DispatchError::Transport(e.to_string()))?;
        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                if data == "[DONE]" {
                    continue;
                }
                match serde_json::from_str::<ChunkPayload>(&data) {
                    Ok(chunk) => {
                        if model.is_empty() {
                            model = chunk.model.clone().unwrap_or_default();
                        }
                        for choice in &chunk.choices {
                            if let Some(content) = choice.delta.content.as_deref() {
                                if !content.is_empty() {
                                    accumulated.push_str(content);
                                    let _ = tx.send(StreamEvent::Delta { text: content.to_string() }).await;
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "unparsable chat-completions SSE chunk"),
                }
            }
        }
        line_buf = remainder;
    }

    let _ = tx
        .send(StreamEvent::Result {
            text: accumulated,
            new_handle: None,
            tokens_in: 0,
            tokens_out: 0,
        })
        .await;
    Ok(())
}

#[derive(Deserialize)]
struct ChunkPayload {
    model: Option<String>,
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}
