//! HTTP client construction and streaming request building.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use tracing::warn;

use crate::client::ClientError;
use crate::model::{Method, StreamRequest};
use crate::options::{ClientOptions, SecretString};

/// Content type negotiated for streaming responses.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Build a configured HTTP client from client options.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(options: &ClientOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => warn!("Ignoring invalid proxy {}: {}", proxy_url, e),
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in client options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Build the HTTP request for one streaming call.
///
/// GET parameters go into the query string, POST parameters into a JSON
/// body. The bearer header is only attached when a credential is present.
pub fn build_stream_request(
    client: &Client,
    url: &str,
    request: &StreamRequest,
    credential: Option<&SecretString>,
    extra_headers: &Option<HashMap<String, String>>,
) -> Result<RequestBuilder, ClientError> {
    let mut req = client
        .request(request.method.into(), url)
        .header(ACCEPT, EVENT_STREAM);

    req = match request.method {
        Method::Get => req.query(&request.query_pairs()?),
        Method::Post => req
            .header(CONTENT_TYPE, "application/json")
            .json(&request.params),
    };

    if let Some(token) = credential {
        req = req.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
    }

    Ok(add_extra_headers(req, extra_headers))
}
