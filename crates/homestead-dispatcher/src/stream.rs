/// Events emitted during a turn's dispatch. `Delta` may fire zero or more
/// times; exactly one of `Result`/`Error` terminates the stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Non-empty incremental text chunk, in model-emission order.
    Delta { text: String },

    /// Terminal success. `text` is authoritative — it SHOULD equal the
    /// concatenation of all prior `Delta` chunks, but wins if a backend
    /// reports a distinct final text.
    Result {
        text: String,
        new_handle: Option<String>,
        tokens_in: u32,
        tokens_out: u32,
    },

    /// Terminal failure, classified per the dispatcher's error taxonomy.
    Error {
        kind: crate::error::DispatchErrorKind,
        message: String,
    },
}

/// Parse a single SSE line (`event: <type>` or `data: <json>`).
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}
