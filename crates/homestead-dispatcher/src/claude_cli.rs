use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};
use crate::provider::{ChatTurn, Message, ModelBackend, Role};
use crate::stream::StreamEvent;

const KILL_GRACE: Duration = Duration::from_secs(5);

/// Subprocess backend that drives the Claude Code CLI, streaming its
/// newline-delimited JSON output as it arrives rather than waiting for the
/// process to exit and parsing one JSON blob.
pub struct ClaudeCliProvider {
    command: String,
}

impl ClaudeCliProvider {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ModelBackend for ClaudeCliProvider {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn dispatch(
        &self,
        turn: &ChatTurn,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let sys_file = tempfile::Builder::new()
            .prefix("homestead-sys-")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| DispatchError::Transport(format!("failed to create temp file: {e}")))?;
        std::fs::write(sys_file.path(), &turn.system)
            .map_err(|e| DispatchError::Transport(format!("failed to write system prompt: {e}")))?;

        let prompt = format_prompt(&turn.messages);

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--system-prompt-file")
            .arg(sys_file.path());
        if let Some(model) = &turn.backend_model {
            cmd.arg("--model").arg(model);
        }
        if let Some(handle) = turn.backend_session_handle.as_deref().filter(|h| !h.is_empty()) {
            cmd.arg("--resume").arg(handle);
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DispatchError::Config(format!(
                    "claude CLI not found at '{}' — install Claude Code first",
                    self.command
                ))
            } else {
                DispatchError::Transport(format!("failed to spawn claude CLI: {e}"))
            }
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!(error = %e, "failed to write prompt to claude stdin");
            }
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DispatchError::Transport("claude CLI stdout missing".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let mut final_text: Option<String> = None;
        let mut new_handle: Option<String> = None;
        let mut tokens_in: u32 = 0;
        let mut tokens_out: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    terminate(&mut child).await;
                    return Err(DispatchError::Cancelled);
                }
                line = lines.next_line() => {
                    let Some(line) = line.map_err(|e| DispatchError::Transport(e.to_string()))? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let value: serde_json::Value = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(e) => {
                            debug!(error = %e, line_len = line.len(), "skipping unparsable claude CLI line");
                            continue;
                        }
                    };

                    match value.get("type").and_then(|t| t.as_str()) {
                        Some("assistant") => {
                            for block in value
                                .pointer("/message/content")
                                .and_then(|c| c.as_array())
                                .into_iter()
                                .flatten()
                            {
                                if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                                        if !text.is_empty() {
                                            let _ = tx.send(StreamEvent::Delta { text: text.to_string() }).await;
                                        }
                                    }
                                }
                            }
                        }
                        Some("result") => {
                            let is_error = value.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);
                            let result_text = value.get("result").and_then(|v| v.as_str()).unwrap_or("").to_string();
                            if is_error {
                                let _ = child.wait().await;
                                let err = DispatchError::Backend(result_text);
                                let _ = tx.send(StreamEvent::Error { kind: err.kind(), message: err.to_string() }).await;
                                return Err(err);
                            }
                            final_text = Some(result_text);
                            new_handle = value.get("session_id").and_then(|v| v.as_str()).map(String::from);
                            tokens_in = value.pointer("/usage/input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                            tokens_out = value.pointer("/usage/output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                        }
                        _ => {}
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DispatchError::Transport(format!("claude CLI process error: {e}")))?;

        let Some(text) = final_text else {
            let err = if status.success() {
                DispatchError::Backend("claude CLI stream ended without a result event".to_string())
            } else {
                DispatchError::Backend(format!("claude CLI exited with {:?}", status.code()))
            };
            let _ = tx.send(StreamEvent::Error { kind: err.kind(), message: err.to_string() }).await;
            return Err(err);
        };

        let _ = tx
            .send(StreamEvent::Result {
                text,
                new_handle,
                tokens_in,
                tokens_out,
            })
            .await;
        Ok(())
    }
}

/// Best-effort preemption: give the child a grace period to exit on its own
/// (it may already be winding down), then force-kill it.
async fn terminate(child: &mut tokio::process::Child) {
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

/// Format conversation history plus the current message as text for stdin,
/// the same shape the CLI's non-streaming mode expects.
fn format_prompt(messages: &[Message]) -> String {
    let mut out = String::new();
    if messages.len() > 1 {
        out.push_str("[Previous conversation]\n");
        for msg in &messages[..messages.len() - 1] {
            let role = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            out.push_str(&format!("{role}: {}\n", msg.content));
        }
        out.push_str("\n[Current message]\n");
    }
    if let Some(last) = messages.last() {
        out.push_str(&last.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_prompt_single_message_is_verbatim() {
        let messages = vec![Message {
            role: Role::User,
            content: "hello".to_string(),
        }];
        assert_eq!(format_prompt(&messages), "hello");
    }

    #[test]
    fn format_prompt_includes_history_before_current() {
        let messages = vec![
            Message {
                role: Role::User,
                content: "first".to_string(),
            },
            Message {
                role: Role::Assistant,
                content: "reply".to_string(),
            },
            Message {
                role: Role::User,
                content: "second".to_string(),
            },
        ];
        let prompt = format_prompt(&messages);
        assert!(prompt.contains("[Previous conversation]"));
        assert!(prompt.ends_with("second"));
    }
}
