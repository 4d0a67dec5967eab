//! Message chunking and delivery for the Telegram channel driver.
//!
//! Telegram's message limit is 4096 characters; 4090 is used for headroom.
//! Interactive replies try MarkdownV2 first and fall back to plain text if
//! Telegram rejects the parse mode (e.g. unbalanced escaping).

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ParseMode as TeloxideParseMode;
use tracing::warn;

use homestead_outbox::ParseMode;

/// Maximum characters per Telegram message (limit is 4096; 4090 for headroom).
pub const CHUNK_MAX: usize = 4090;

/// Code-fence-aware message splitter.
///
/// When a split falls inside a fenced code block, the fence is closed before
/// the chunk boundary and re-opened at the start of the next chunk.
pub fn split_chunks_smart(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut fence_lang: Option<String> = None;

    for line in &lines {
        let cost = if current.is_empty() {
            line.len()
        } else {
            1 + line.len()
        };

        if !current.is_empty() && current.len() + cost > CHUNK_MAX {
            if fence_lang.is_some() {
                current.push_str("\n```");
            }
            chunks.push(current);
            current = String::new();
            if let Some(ref lang) = fence_lang {
                if lang.is_empty() {
                    current.push_str("```\n");
                } else {
                    current.push_str("```");
                    current.push_str(lang);
                    current.push('\n');
                }
            }
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        let trimmed = line.trim_start();
        if let Some(after_fence) = trimmed.strip_prefix("```") {
            if fence_lang.is_some() {
                fence_lang = None;
            } else {
                fence_lang = Some(after_fence.trim().to_string());
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    // Force-split any chunk still over the limit (e.g. one very long line).
    let mut result = Vec::new();
    for chunk in chunks {
        if chunk.len() <= CHUNK_MAX {
            result.push(chunk);
        } else {
            let mut remaining = chunk.as_str();
            while remaining.len() > CHUNK_MAX {
                let split_at = remaining[..CHUNK_MAX]
                    .rfind('\n')
                    .or_else(|| remaining[..CHUNK_MAX].rfind(' '))
                    .unwrap_or(CHUNK_MAX);
                result.push(remaining[..split_at].to_string());
                remaining = remaining[split_at..].trim_start();
            }
            if !remaining.is_empty() {
                result.push(remaining.to_string());
            }
        }
    }

    result
}

/// Escape MarkdownV2 special characters: `_ * [ ] ( ) ~ \` # + - = | { } . !`
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '#' | '+' | '-' | '=' | '|'
            | '{' | '}' | '.' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Send `text` to `chat_id` as interactive chunks, trying MarkdownV2 first
/// and falling back to plain text per-chunk on send failure. Best-effort:
/// failures are logged, not surfaced, since there is no caller to retry a
/// conversational reply.
pub async fn send_response(bot: &Bot, chat_id: ChatId, text: &str) {
    let chunks = split_chunks_smart(text);
    for (i, chunk) in chunks.iter().enumerate() {
        let escaped = escape_markdown_v2(chunk);
        let sent = bot
            .send_message(chat_id, &escaped)
            .parse_mode(TeloxideParseMode::MarkdownV2)
            .await;

        if sent.is_err() {
            if let Err(e) = bot.send_message(chat_id, chunk).await {
                warn!(error = %e, chunk_index = i, "telegram: plain-text fallback send failed");
            }
        }

        if i + 1 < chunks.len() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Deliver `text` honoring an explicit outbox parse mode, surfacing the
/// first send error to the caller (the outbox drainer decides whether to
/// retry).
pub async fn deliver_chunks(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    mode: ParseMode,
) -> std::result::Result<(), String> {
    let chunks = split_chunks_smart(text);
    for (i, chunk) in chunks.iter().enumerate() {
        let result = match mode {
            ParseMode::Html => {
                bot.send_message(chat_id, chunk)
                    .parse_mode(TeloxideParseMode::Html)
                    .await
            }
            ParseMode::MarkdownV2 => {
                bot.send_message(chat_id, escape_markdown_v2(chunk))
                    .parse_mode(TeloxideParseMode::MarkdownV2)
                    .await
            }
            ParseMode::PlainText => bot.send_message(chat_id, chunk).await,
        };
        result.map_err(|e| e.to_string())?;

        if i + 1 < chunks.len() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_chunks_smart("Hello, world!");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Hello, world!");
    }

    #[test]
    fn exactly_chunk_max_is_single_chunk() {
        let text = "a".repeat(CHUNK_MAX);
        let chunks = split_chunks_smart(&text);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn over_limit_splits_on_newline() {
        let line = "a".repeat(2000);
        let text = format!("{line}\n{line}\n{line}");
        let chunks = split_chunks_smart(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn very_long_single_line_force_splits() {
        let text = "x".repeat(9000);
        let chunks = split_chunks_smart(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX);
        }
    }

    #[test]
    fn code_fence_preserved_across_chunks() {
        let mut text = String::from("Intro.\n```rust\n");
        for i in 0..200 {
            text.push_str(&format!("let variable_name_{i:04} = {i:05}; // comment\n"));
        }
        text.push_str("```\nAfter fence.");

        let chunks = split_chunks_smart(&text);
        assert!(chunks.len() >= 2, "expected multiple chunks, got {}", chunks.len());
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn code_fence_language_preserved() {
        let mut text = String::from("```python\n");
        for _ in 0..100 {
            text.push_str("print('hello world this is a reasonably long line of python code')\n");
        }
        text.push_str("```\n");

        let chunks = split_chunks_smart(&text);
        assert!(chunks.len() >= 2);
        assert!(
            chunks[1].starts_with("```python"),
            "second chunk should reopen with ```python, got: {}",
            &chunks[1][..chunks[1].len().min(60)]
        );
    }

    #[test]
    fn escape_markdown_v2_escapes_specials() {
        let input = "Hello. World! (test) [link] ~strike~";
        let escaped = escape_markdown_v2(input);
        assert!(escaped.contains("\\."));
        assert!(escaped.contains("\\!"));
        assert!(escaped.contains("\\("));
        assert!(escaped.contains("\\)"));
        assert!(escaped.contains("\\["));
        assert!(escaped.contains("\\]"));
        assert!(escaped.contains("\\~"));
    }

    #[test]
    fn escape_markdown_v2_leaves_normal_chars() {
        let input = "Hello world 123 abc";
        assert_eq!(escape_markdown_v2(input), input);
    }
}
