//! One end-to-end streaming call.
//!
//! ```text
//! Idle -> Requesting -> Streaming -> Completed
//!             |             |-----> Errored
//!             |-------------+-----> Aborted
//! ```
//!
//! A session delivers tokens in arrival order and then resolves exactly
//! once. Cancellation is not an error: it resolves with [`Outcome::Aborted`].

use std::collections::HashMap;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use crate::client::{ClientError, TokenSink};
use crate::http::build_stream_request;
use crate::model::StreamRequest;
use crate::options::{ClientOptions, ErrorEvents, SecretString};
use crate::stream::{StreamEvent, TokenPipeline};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Errored,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Errored | SessionState::Aborted
        )
    }
}

/// Successful terminal outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// End of body or the `[DONE]` sentinel.
    Completed,
    /// The caller cancelled the session.
    Aborted,
}

/// A single streaming request and its decode state.
#[derive(Debug)]
pub struct StreamSession {
    http: reqwest::Client,
    url: String,
    request: StreamRequest,
    credential: Option<SecretString>,
    extra_headers: Option<HashMap<String, String>>,
    error_events: ErrorEvents,
    state: SessionState,
}

impl StreamSession {
    /// Create an idle session.
    ///
    /// The credential is resolved by the caller; `None` sends the request
    /// without an `Authorization` header.
    pub fn new(
        http: reqwest::Client,
        options: &ClientOptions,
        request: StreamRequest,
        credential: Option<SecretString>,
    ) -> Self {
        Self {
            http,
            url: options.endpoint(&request.path),
            request,
            credential,
            extra_headers: options.extra_headers.clone(),
            error_events: options.error_events,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Drive the session to completion on the current task.
    ///
    /// On failure `sink.on_error` is called once before the error is
    /// returned. A session that already reached a terminal state is not
    /// restarted.
    pub async fn run<S>(
        &mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ClientError>
    where
        S: TokenSink + ?Sized,
    {
        if self.state != SessionState::Idle {
            return Err(ClientError::Config(format!(
                "session already started (state {:?})",
                self.state
            )));
        }

        debug!(url = %self.url, method = ?self.request.method, "starting stream session");
        self.transition(SessionState::Requesting);

        let result = self.execute(sink, cancel).await;
        self.settle(result, sink)
    }

    /// Run the session on a new tokio task.
    pub fn spawn<S>(mut self, mut sink: S) -> SessionHandle
    where
        S: TokenSink + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(&mut sink, &token).await });

        SessionHandle {
            task,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    async fn execute<S>(
        &mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ClientError>
    where
        S: TokenSink + ?Sized,
    {
        let request = build_stream_request(
            &self.http,
            &self.url,
            &self.request,
            self.credential.as_ref(),
            &self.extra_headers,
        )?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Outcome::Aborted),
            response = request.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        self.transition(SessionState::Streaming);
        let mut pipeline = TokenPipeline::new(self.error_events);
        consume(response.bytes_stream(), &mut pipeline, sink, cancel).await
    }

    fn settle<S>(
        &mut self,
        result: Result<Outcome, ClientError>,
        sink: &mut S,
    ) -> Result<Outcome, ClientError>
    where
        S: TokenSink + ?Sized,
    {
        match &result {
            Ok(Outcome::Completed) => self.transition(SessionState::Completed),
            Ok(Outcome::Aborted) => self.transition(SessionState::Aborted),
            Err(e) => {
                self.transition(SessionState::Errored);
                warn!(url = %self.url, error = %e, "stream session failed");
                sink.on_error(&e.to_string());
            }
        }
        result
    }

    fn transition(&mut self, next: SessionState) {
        debug!(url = %self.url, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

/// Read a body to the end, delivering tokens to `sink`.
///
/// Cancellation is checked while waiting for each chunk and before each
/// token, so a pending read is abandoned immediately and no token follows
/// a cancel. Nothing is read after the sentinel.
pub async fn consume<B, E, S>(
    body: B,
    pipeline: &mut TokenPipeline,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<Outcome, ClientError>
where
    B: Stream<Item = Result<Bytes, E>>,
    E: Into<ClientError>,
    S: TokenSink + ?Sized,
{
    futures::pin_mut!(body);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Outcome::Aborted),
            next = body.next() => next,
        };

        let (events, end_of_body) = match next {
            Some(Ok(chunk)) => (pipeline.feed(&chunk)?, false),
            Some(Err(e)) => return Err(e.into()),
            None => (pipeline.finish()?, true),
        };

        if let Some(outcome) = deliver(events, sink, cancel)? {
            return Ok(outcome);
        }

        if end_of_body {
            trace!("end of body");
            return Ok(Outcome::Completed);
        }
    }
}

fn deliver<S>(
    events: Vec<StreamEvent>,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<Option<Outcome>, ClientError>
where
    S: TokenSink + ?Sized,
{
    for event in events {
        if cancel.is_cancelled() {
            return Ok(Some(Outcome::Aborted));
        }
        match event {
            StreamEvent::Token(token) => sink.on_token(&token),
            StreamEvent::Done => {
                trace!("done marker received");
                return Ok(Some(Outcome::Completed));
            }
            StreamEvent::ServerError(message) => return Err(ClientError::ServerEvent(message)),
            StreamEvent::MalformedEncoding { offset } => {
                return Err(ClientError::MalformedEncoding { offset })
            }
        }
    }
    Ok(None)
}

/// A session running on its own task.
///
/// Dropping the handle cancels the session.
#[derive(Debug)]
pub struct SessionHandle {
    task: JoinHandle<Result<Outcome, ClientError>>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl SessionHandle {
    /// Cancel the session. Idempotent, and a no-op once it has finished.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this session, for use from other tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome.
    pub async fn completion(self) -> Result<Outcome, ClientError> {
        let SessionHandle { task, _guard, .. } = self;
        task.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Method;
    use futures::stream;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        tokens: Vec<String>,
        errors: Vec<String>,
    }

    impl TokenSink for Recorder {
        fn on_token(&mut self, token: &str) {
            self.tokens.push(token.to_string());
        }

        fn on_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn chunks(parts: &[&'static str]) -> Vec<Result<Bytes, ClientError>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect()
    }

    #[tokio::test]
    async fn test_tokens_then_done() {
        let mut body = chunks(&[
            "data: {\"content\":\"He\"}\n",
            "data: {\"content\":\"llo\"}\n",
            "data: [DONE]\n",
        ]);
        // Must never be read.
        body.push(Err(ClientError::Config("read after done".to_string())));

        let mut pipeline = TokenPipeline::default();
        let mut sink = Recorder::default();
        let outcome = consume(
            stream::iter(body),
            &mut pipeline,
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(sink.tokens, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_end_of_body_completes() {
        let mut pipeline = TokenPipeline::default();
        let mut sink = Recorder::default();
        let outcome = consume(
            stream::iter(chunks(&["data: a\n", "data: b"])),
            &mut pipeline,
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(sink.tokens, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_cancel_before_first_chunk() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut pipeline = TokenPipeline::default();
        let mut sink = Recorder::default();
        let outcome = consume(
            stream::pending::<Result<Bytes, ClientError>>(),
            &mut pipeline,
            &mut sink,
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Aborted);
        assert!(sink.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_from_callback_stops_delivery() {
        struct CancelOnFirst {
            tokens: Vec<String>,
            cancel: CancellationToken,
        }

        impl TokenSink for CancelOnFirst {
            fn on_token(&mut self, token: &str) {
                self.tokens.push(token.to_string());
                self.cancel.cancel();
            }
        }

        let cancel = CancellationToken::new();
        let mut sink = CancelOnFirst {
            tokens: Vec::new(),
            cancel: cancel.clone(),
        };
        let body = stream::iter(chunks(&["data: one\ndata: two\n"])).chain(stream::pending());

        let mut pipeline = TokenPipeline::default();
        let outcome = consume(body, &mut pipeline, &mut sink, &cancel).await.unwrap();

        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(sink.tokens, vec!["one"]);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_read() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let body = stream::iter(chunks(&["data: first\n"])).chain(stream::pending());
            let mut pipeline = TokenPipeline::default();
            let mut sink = tx;
            consume(body, &mut pipeline, &mut sink, &token).await
        });

        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        cancel.cancel();
        cancel.cancel();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_error_keeps_delivered_tokens() {
        let body: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: kept\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
        ];

        let mut pipeline = TokenPipeline::default();
        let mut sink = Recorder::default();
        let result = consume(
            stream::iter(body),
            &mut pipeline,
            &mut sink,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(ClientError::Read(_))));
        assert_eq!(sink.tokens, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_surfaced_server_error() {
        let mut pipeline = TokenPipeline::new(ErrorEvents::Surface);
        let mut sink = Recorder::default();
        let result = consume(
            stream::iter(chunks(&["data: partial\n", "event:error\ndata:quota exceeded\n"])),
            &mut pipeline,
            &mut sink,
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(ClientError::ServerEvent(message)) => assert_eq!(message, "quota exceeded"),
            other => panic!("expected server event error, got {:?}", other),
        }
        assert_eq!(sink.tokens, vec!["partial"]);
    }

    #[tokio::test]
    async fn test_invalid_byte_after_done_completes() {
        let body = &b"data: a\ndata: [DONE]\n\xFF"[..];

        for parts in [vec![body], vec![&body[..21], &body[21..]]] {
            let chunks: Vec<Result<Bytes, ClientError>> = parts
                .into_iter()
                .map(|p| Ok(Bytes::copy_from_slice(p)))
                .collect();
            let mut pipeline = TokenPipeline::default();
            let mut sink = Recorder::default();
            let outcome = consume(
                stream::iter(chunks),
                &mut pipeline,
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            assert_eq!(outcome, Outcome::Completed);
            assert_eq!(sink.tokens, vec!["a"]);
        }
    }

    #[tokio::test]
    async fn test_invalid_byte_delivers_preceding_tokens() {
        let body = &b"data: a\ndata: b\n\xFFdata: c\n"[..];

        for split in [body.len(), 4, 17] {
            let (head, tail) = body.split_at(split);
            let chunks: Vec<Result<Bytes, ClientError>> = vec![
                Ok(Bytes::copy_from_slice(head)),
                Ok(Bytes::copy_from_slice(tail)),
            ];
            let mut pipeline = TokenPipeline::default();
            let mut sink = Recorder::default();
            let result = consume(
                stream::iter(chunks),
                &mut pipeline,
                &mut sink,
                &CancellationToken::new(),
            )
            .await;

            assert!(
                matches!(result, Err(ClientError::MalformedEncoding { offset: 16 })),
                "split at byte {}: {:?}",
                split,
                result
            );
            assert_eq!(sink.tokens, vec!["a", "b"]);
        }
    }

    fn session(base_url: &str) -> StreamSession {
        let request = StreamRequest {
            path: "/ai/chat/stream".to_string(),
            method: Method::Get,
            params: json!({"prompt": "hi", "sceneCode": "chat"}),
        };
        StreamSession::new(
            reqwest::Client::new(),
            &ClientOptions::new(base_url),
            request,
            None,
        )
    }

    #[tokio::test]
    async fn test_run_cancelled_before_request() {
        let mut session = session("http://localhost:9002");
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.url(), "http://localhost:9002/ai/chat/stream");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = Recorder::default();

        let outcome = session.run(&mut sink, &cancel).await.unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(session.state(), SessionState::Aborted);
        assert!(sink.errors.is_empty());
    }

    #[tokio::test]
    async fn test_run_transport_error_reports_once() {
        let mut session = session("http://127.0.0.1:1");
        let mut sink = Recorder::default();

        let result = session.run(&mut sink, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ClientError::Http(_))));
        assert_eq!(session.state(), SessionState::Errored);
        assert!(session.state().is_terminal());
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.tokens.is_empty());

        // A finished session is not restarted.
        let again = session.run(&mut sink, &CancellationToken::new()).await;
        assert!(matches!(again, Err(ClientError::Config(_))));
        assert_eq!(sink.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_reports_finished() {
        let handle = session("http://127.0.0.1:1").spawn(Recorder::default());
        assert!(!handle.is_finished());
        handle.abort();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !handle.is_finished() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session did not finish");

        assert_eq!(handle.completion().await.unwrap(), Outcome::Aborted);
    }
}
