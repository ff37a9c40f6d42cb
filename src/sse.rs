//! Server-Sent Events line splitting and frame classification.
//!
//! Only the subset of the SSE format used by the streaming endpoints is
//! recognized:
//! ```text
//! data: {"content": "He"}
//! data:llo
//! event:error
//! data: upstream failed
//! data: [DONE]
//! ```

/// Prefix of a payload-carrying line.
pub const DATA_PREFIX: &str = "data:";

/// Prefix of an event name line.
pub const EVENT_PREFIX: &str = "event:";

/// Event name announcing that the server is reporting an error.
pub const ERROR_EVENT: &str = "error";

/// Literal payload that ends a stream normally.
pub const DONE_MARKER: &str = "[DONE]";

/// Splits decoded text into complete lines, carrying any partial line over
/// to the next fragment.
///
/// The carried buffer never contains a `\n`.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every line it completes.
    ///
    /// Line terminators are consumed; a trailing `\r` is stripped so that
    /// CRLF bodies split the same way as LF bodies.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete[..last_newline]
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// Take the unterminated remainder at end of body, if any.
    pub fn finish(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buffer);
        let line = remainder.strip_suffix('\r').unwrap_or(&remainder);
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }

    /// Length of the carried partial line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// A classified protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Payload line; the body excludes the prefix and one optional space.
    Data(&'a str),
    /// `event:error` announcement. Detail, if any, follows as a data line.
    ErrorEvent,
    /// Keep-alives, comments and any other field.
    Other,
}

/// Classify one line of the stream.
pub fn classify(line: &str) -> Frame<'_> {
    if let Some(body) = parse_sse_line(line) {
        return Frame::Data(body);
    }

    if let Some(event) = line.strip_prefix(EVENT_PREFIX) {
        let name = event.strip_prefix(' ').unwrap_or(event);
        if name.trim_end() == ERROR_EVENT {
            return Frame::ErrorEvent;
        }
    }

    Frame::Other
}

/// Parse an SSE line to extract the data portion.
///
/// Exactly one space after the colon is removed; any further whitespace is
/// part of the payload.
///
/// # Example
/// ```
/// use tokenflow::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"key\": \"value\"}"), Some("{\"key\": \"value\"}"));
/// assert_eq!(parse_sse_line("data:  indented"), Some(" indented"));
/// assert_eq!(parse_sse_line("invalid"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
}

/// Check if an SSE data payload indicates the stream is done.
///
/// # Example
/// ```
/// use tokenflow::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(is_done_marker("  [DONE] "));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data.trim() == DONE_MARKER
}
