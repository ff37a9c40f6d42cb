//! Streaming chat against a running backend.
//!
//! Run with:
//! ```bash
//! export TOKENFLOW_BASE_URL="http://localhost:9002"
//! export TOKENFLOW_TOKEN="your-login-token"   # optional
//! cargo run --example chat_stream -- "Write a haiku about Rust programming."
//! ```
//!
//! Press Ctrl-C to cancel the stream.

use std::io::Write;

use tokenflow::client::{Callbacks, StreamClient};
use tokenflow::model::ChatRequest;
use tokenflow::options::{ClientOptions, DEFAULT_BASE_URL};
use tokenflow::session::Outcome;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let base_url =
        std::env::var("TOKENFLOW_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let credential = std::env::var("TOKENFLOW_TOKEN").ok().map(Into::into);
    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Hello!".to_string());

    let client = StreamClient::new(ClientOptions::new(base_url))?.with_credential(credential);

    let sink = Callbacks::new(
        |token: &str| {
            print!("{}", token);
            // Flush stdout to show text immediately
            let _ = std::io::stdout().flush();
        },
        |error: &str| eprintln!("\nError in stream: {}", error),
    );

    let handle = client.stream_chat(ChatRequest::new(prompt), sink)?;
    let cancel = handle.cancel_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match handle.completion().await? {
        Outcome::Completed => println!("\n\n=== Stream Complete ==="),
        Outcome::Aborted => println!("\n\n=== Stream Cancelled ==="),
    }

    Ok(())
}
