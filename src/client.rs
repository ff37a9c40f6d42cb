//! Streaming client, token sink contract and error types.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::http::build_http_client;
use crate::model::{
    ChatRequest, CorrectArticleRequest, Endpoint, GenerateArticleRequest, OptimizeArticleRequest,
    StreamRequest,
};
use crate::options::{ClientOptions, SecretString};
use crate::session::{SessionHandle, StreamSession};

/// Errors that can terminate a streaming session.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stream read error: {0}")]
    Read(#[from] std::io::Error),

    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Malformed UTF-8 in response body at byte {offset}")]
    MalformedEncoding { offset: u64 },

    #[error("Server error event: {0}")]
    ServerEvent(String),

    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Receiver of the tokens produced by a session.
///
/// Calls happen synchronously on the session task, in arrival order. A slow
/// `on_token` delays the next network read.
pub trait TokenSink: Send {
    /// Called once per decoded token.
    fn on_token(&mut self, token: &str);

    /// Called at most once, when the session fails. Not called on abort.
    fn on_error(&mut self, _message: &str) {}
}

impl<F> TokenSink for F
where
    F: FnMut(&str) + Send,
{
    fn on_token(&mut self, token: &str) {
        self(token)
    }
}

/// A token callback paired with an error callback.
///
/// # Example
/// ```
/// use tokenflow::client::{Callbacks, TokenSink};
///
/// let mut text = String::new();
/// let mut sink = Callbacks::new(|t: &str| text.push_str(t), |e: &str| eprintln!("{e}"));
/// sink.on_token("He");
/// sink.on_token("llo");
/// drop(sink);
/// assert_eq!(text, "Hello");
/// ```
pub struct Callbacks<T, E> {
    on_token: T,
    on_error: E,
}

impl<T, E> Callbacks<T, E>
where
    T: FnMut(&str) + Send,
    E: FnMut(&str) + Send,
{
    pub fn new(on_token: T, on_error: E) -> Self {
        Self { on_token, on_error }
    }
}

impl<T, E> TokenSink for Callbacks<T, E>
where
    T: FnMut(&str) + Send,
    E: FnMut(&str) + Send,
{
    fn on_token(&mut self, token: &str) {
        (self.on_token)(token)
    }

    fn on_error(&mut self, message: &str) {
        (self.on_error)(message)
    }
}

/// Channel form of the sink: every token is sent to the receiver. The
/// channel closes when the session ends and drops its sender.
impl TokenSink for mpsc::UnboundedSender<String> {
    fn on_token(&mut self, token: &str) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(token.to_string());
    }
}

/// Entry point for the streaming endpoints.
///
/// Holds the HTTP connection pool, the options and the caller's credential.
/// Every call starts an independent session; sessions share nothing but the
/// connection pool.
///
/// # Example
/// ```no_run
/// use tokenflow::client::StreamClient;
/// use tokenflow::model::ChatRequest;
/// use tokenflow::options::ClientOptions;
///
/// # async fn run() -> Result<(), tokenflow::ClientError> {
/// let client = StreamClient::new(ClientOptions::default())?
///     .with_credential(Some("token".into()));
///
/// let handle = client.stream_chat(ChatRequest::new("hi"), |token: &str| print!("{token}"))?;
/// handle.completion().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    options: ClientOptions,
    credential: Option<SecretString>,
}

impl StreamClient {
    /// Create a client without a credential.
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http_client(&options)?,
            options,
            credential: None,
        })
    }

    /// Set the bearer credential used by sessions started from now on.
    pub fn with_credential(mut self, credential: Option<SecretString>) -> Self {
        self.credential = credential;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Create a session without starting it.
    pub fn session(&self, request: StreamRequest) -> StreamSession {
        StreamSession::new(
            self.http.clone(),
            &self.options,
            request,
            self.credential.clone(),
        )
    }

    /// Start a session on its own task.
    pub fn start<S>(&self, request: StreamRequest, sink: S) -> SessionHandle
    where
        S: TokenSink + 'static,
    {
        self.session(request).spawn(sink)
    }

    fn start_endpoint<R, S>(&self, request: &R, sink: S) -> Result<SessionHandle, ClientError>
    where
        R: Endpoint,
        S: TokenSink + 'static,
    {
        Ok(self.start(request.to_request()?, sink))
    }

    /// Stream a conversational reply.
    pub fn stream_chat<S>(&self, request: ChatRequest, sink: S) -> Result<SessionHandle, ClientError>
    where
        S: TokenSink + 'static,
    {
        self.start_endpoint(&request, sink)
    }

    /// Stream a generated article.
    pub fn stream_generate_article<S>(
        &self,
        request: GenerateArticleRequest,
        sink: S,
    ) -> Result<SessionHandle, ClientError>
    where
        S: TokenSink + 'static,
    {
        self.start_endpoint(&request, sink)
    }

    /// Stream an optimized version of an article.
    pub fn stream_optimize_article<S>(
        &self,
        request: OptimizeArticleRequest,
        sink: S,
    ) -> Result<SessionHandle, ClientError>
    where
        S: TokenSink + 'static,
    {
        self.start_endpoint(&request, sink)
    }

    /// Stream a corrected version of an article.
    pub fn stream_correct_article<S>(
        &self,
        request: CorrectArticleRequest,
        sink: S,
    ) -> Result<SessionHandle, ClientError>
    where
        S: TokenSink + 'static,
    {
        self.start_endpoint(&request, sink)
    }
}
