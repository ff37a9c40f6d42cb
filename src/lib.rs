//! # tokenflow - streaming token consumption over Server-Sent Events
//!
//! Turns a chunked `text/event-stream` HTTP response into an ordered
//! sequence of text tokens delivered to a caller-supplied sink.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Multi-byte characters and lines split across network reads are reassembled
//! - JSON `{"content": ...}` payloads with a raw-text fallback
//! - `[DONE]` sentinel handling
//! - Immediate, idempotent cancellation of in-flight reads
//! - Independent concurrent sessions with no shared mutable state
//!
//! ## Architecture
//!
//! ```text
//! network chunk -> ChunkDecoder -> LineSplitter -> classify -> decode_payload -> TokenSink
//! ```
//!
//! - **`StreamClient`**: shared HTTP client, options and credential; starts sessions
//! - **`StreamSession`**: one request and its state machine
//! - **`SessionHandle`**: a spawned session with its cancel function and completion
//! - **`TokenSink`**: the token/error callback contract
//!
//! ## Example
//! ```no_run
//! use tokenflow::client::{Callbacks, StreamClient};
//! use tokenflow::model::ChatRequest;
//! use tokenflow::options::ClientOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StreamClient::new(ClientOptions::new("http://localhost:9002"))?
//!         .with_credential(Some("token".into()));
//!
//!     let sink = Callbacks::new(
//!         |token: &str| print!("{}", token),
//!         |error: &str| eprintln!("stream failed: {}", error),
//!     );
//!
//!     let handle = client.stream_chat(ChatRequest::new("Hello!"), sink)?;
//!     let outcome = handle.completion().await?;
//!     println!("\n{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod decoder;
pub mod http;
pub mod model;
pub mod options;
pub mod payload;
pub mod session;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use client::{Callbacks, ClientError, StreamClient, TokenSink};
pub use model::{Method, StreamRequest};
pub use options::{ClientOptions, ErrorEvents, SecretString};
pub use session::{Outcome, SessionHandle, SessionState, StreamSession};
pub use stream::{StreamEvent, TokenPipeline, TokenResponseExt};
