//! Client configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Base URL of the streaming backend when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:9002";

/// A secret string type for sensitive data like bearer tokens.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// How `event:error` frames affect a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorEvents {
    /// The announcement is ignored; the data line that follows is an
    /// ordinary token.
    #[default]
    Informational,
    /// The data line that follows becomes the session error.
    Surface,
}

/// Options shared by every session a client starts.
///
/// # Example
/// ```rust
/// use tokenflow::options::{ClientOptions, ErrorEvents};
/// use std::time::Duration;
///
/// let options = ClientOptions::new("http://localhost:9002")
///     .with_timeout(Duration::from_secs(300))
///     .with_error_events(ErrorEvents::Surface);
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL that endpoint paths are appended to
    pub base_url: String,

    /// Whole-request timeout enforced by the transport. `None` waits forever.
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,

    /// Treatment of server error events
    pub error_events: ErrorEvents,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientOptions {
    /// Create options pointing at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            proxy: None,
            extra_headers: None,
            error_events: ErrorEvents::default(),
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Set the error event policy.
    pub fn with_error_events(mut self, error_events: ErrorEvents) -> Self {
        self.error_events = error_events;
        self
    }

    /// Join the base URL and an endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = SecretString::from("abc123");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(secret.expose_secret(), "abc123");
    }

    #[test]
    fn test_endpoint_join() {
        let options = ClientOptions::new("http://host:9002/");
        assert_eq!(options.endpoint("/ai/chat/stream"), "http://host:9002/ai/chat/stream");
        assert_eq!(
            ClientOptions::default().endpoint("article/ai/generate/stream"),
            "http://localhost:9002/article/ai/generate/stream"
        );
    }

    #[test]
    fn test_builders() {
        let options = ClientOptions::default()
            .with_header("X-Tenant".to_string(), "7".to_string())
            .with_timeout(Duration::from_secs(5))
            .with_error_events(ErrorEvents::Surface);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.error_events, ErrorEvents::Surface);
        assert_eq!(
            options.extra_headers.unwrap().get("X-Tenant").map(String::as_str),
            Some("7")
        );
    }
}
