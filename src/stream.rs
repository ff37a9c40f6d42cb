//! The per-session decode pipeline and its `Stream` adapter.
//!
//! ```text
//! bytes -> ChunkDecoder -> LineSplitter -> classify -> decode_payload -> tokens
//! ```

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tracing::trace;

use crate::client::ClientError;
use crate::decoder::ChunkDecoder;
use crate::options::ErrorEvents;
use crate::payload::{decode_payload, Payload};
use crate::sse::{classify, Frame, LineSplitter};

/// Output of the pipeline for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    /// The end-of-stream sentinel was received.
    Done,
    /// Detail of a server error event (only under [`ErrorEvents::Surface`]).
    ServerError(String),
    /// Undecodable bytes at this body offset. Nothing after them is read.
    MalformedEncoding { offset: u64 },
}


/// Decoder, splitter and classifier state for one response body.
#[derive(Debug, Default)]
pub struct TokenPipeline {
    decoder: ChunkDecoder,
    splitter: LineSplitter,
    error_events: ErrorEvents,
    error_announced: bool,
}

impl TokenPipeline {
    pub fn new(error_events: ErrorEvents) -> Self {
        Self {
            error_events,
            ..Self::default()
        }
    }

    /// Feed the next network chunk and collect the events it completes.
    ///
    /// Lines before an invalid byte sequence are still processed; the
    /// [`StreamEvent::MalformedEncoding`] event follows them.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, ClientError> {
        let decoded = self.decoder.decode(chunk)?;
        let lines = self.splitter.push(&decoded.text);
        trace!(
            bytes = chunk.len(),
            lines = lines.len(),
            carried = self.splitter.pending(),
            "chunk decoded"
        );

        let mut events: Vec<StreamEvent> = lines
            .iter()
            .filter_map(|line| self.process_line(line))
            .collect();
        if let Some(offset) = decoded.malformed_at {
            // The partial line was cut by the invalid bytes.
            self.splitter.finish();
            events.push(StreamEvent::MalformedEncoding { offset });
        }
        Ok(events)
    }

    /// Flush state at end of body.
    ///
    /// An unterminated last line is processed as a final frame, followed by
    /// [`StreamEvent::MalformedEncoding`] if a character was cut off.
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>, ClientError> {
        let truncated_at = self.decoder.finish();
        let mut events: Vec<StreamEvent> = self
            .splitter
            .finish()
            .and_then(|line| self.process_line(&line))
            .into_iter()
            .collect();
        if let Some(offset) = truncated_at {
            events.push(StreamEvent::MalformedEncoding { offset });
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            // A blank line ends the current event.
            self.error_announced = false;
            return None;
        }

        match classify(line) {
            Frame::Data(body) => {
                let announced = std::mem::take(&mut self.error_announced);
                match decode_payload(body) {
                    Payload::Done => Some(StreamEvent::Done),
                    Payload::Token(_) if announced => {
                        Some(StreamEvent::ServerError(body.to_string()))
                    }
                    Payload::Token(token) => Some(StreamEvent::Token(token)),
                }
            }
            Frame::ErrorEvent => {
                trace!("server error event announced");
                self.error_announced = self.error_events == ErrorEvents::Surface;
                None
            }
            Frame::Other => None,
        }
    }
}

/// Turn a byte stream into a stream of tokens.
///
/// The stream ends after the sentinel or at end of body, and yields at most
/// one error, after which it ends as well.
pub fn token_stream<B, E>(
    body: B,
    error_events: ErrorEvents,
) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    B: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send,
{
    struct State<B> {
        body: std::pin::Pin<Box<B>>,
        pipeline: TokenPipeline,
        pending: VecDeque<StreamEvent>,
        finished: bool,
    }

    let state = State {
        body: Box::pin(body),
        pipeline: TokenPipeline::new(error_events),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                match event {
                    StreamEvent::Token(token) => return Some((Ok(token), state)),
                    StreamEvent::Done => return None,
                    StreamEvent::ServerError(message) => {
                        state.pending.clear();
                        state.finished = true;
                        return Some((Err(ClientError::ServerEvent(message)), state));
                    }
                    StreamEvent::MalformedEncoding { offset } => {
                        state.pending.clear();
                        state.finished = true;
                        return Some((Err(ClientError::MalformedEncoding { offset }), state));
                    }
                }
            }

            if state.finished {
                return None;
            }

            let events = match state.body.next().await {
                Some(Ok(chunk)) => state.pipeline.feed(&chunk),
                Some(Err(e)) => Err(e.into()),
                None => {
                    state.finished = true;
                    state.pipeline.finish()
                }
            };

            match events {
                Ok(events) => state.pending.extend(events),
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            }
        }
    })
}

/// Extension trait for `reqwest::Response` to consume a token stream.
///
/// # Example
/// ```ignore
/// use tokenflow::stream::TokenResponseExt;
///
/// let response = client.get("http://localhost:9002/ai/chat/stream").send().await?;
/// let mut tokens = response.tokens();
/// while let Some(token) = tokens.next().await {
///     print!("{}", token?);
/// }
/// ```
pub trait TokenResponseExt {
    /// Tokens of the body, with error events treated as informational.
    fn tokens(self) -> impl Stream<Item = Result<String, ClientError>> + Send;
}

impl TokenResponseExt for reqwest::Response {
    fn tokens(self) -> impl Stream<Item = Result<String, ClientError>> + Send {
        token_stream(self.bytes_stream(), ErrorEvents::Informational)
    }
}
