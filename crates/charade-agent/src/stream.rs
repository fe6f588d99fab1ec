/// Events emitted while consuming a streaming completion response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// Stream completed successfully (terminal sentinel observed).
    Done { stop_reason: String },

    /// Transport error during streaming. The stream is abandoned; no retry.
    Error { message: String },
}

/// Parse a single SSE line.
/// SSE format: `event: <type>\ndata: <json>\n\n`
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_line_parses() {
        match parse_sse_line("data: {\"x\":1}") {
            Some(SseParsed::Data(d)) => assert_eq!(d, "{\"x\":1}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn event_line_parses() {
        match parse_sse_line("event: message") {
            Some(SseParsed::Event(e)) => assert_eq!(e, "message"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn other_lines_are_ignored() {
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("").is_none());
    }
}
