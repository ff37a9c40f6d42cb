//! Request models for the streaming endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ClientError;

/// HTTP method of a streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// Parameters are sent as a query string.
    Get,
    /// Parameters are sent as a JSON body.
    Post,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// Target and parameters of one streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Endpoint path relative to the client base URL
    pub path: String,
    pub method: Method,
    /// Query parameters for GET, JSON body for POST
    pub params: Value,
}

impl StreamRequest {
    /// Build a request from any serializable parameter set.
    pub fn new(
        path: impl Into<String>,
        method: Method,
        params: &impl Serialize,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            path: path.into(),
            method,
            params: serde_json::to_value(params)?,
        })
    }

    /// Query string pairs for a GET request.
    ///
    /// Null values are skipped, strings are used as-is and any other
    /// value is rendered as JSON text.
    pub fn query_pairs(&self) -> Result<Vec<(String, String)>, ClientError> {
        let object = match &self.params {
            Value::Object(object) => object,
            Value::Null => return Ok(Vec::new()),
            other => {
                return Err(ClientError::Config(format!(
                    "query parameters must be an object, got {}",
                    other
                )))
            }
        };

        Ok(object
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect())
    }
}

/// A request type bound to a fixed endpoint.
pub trait Endpoint: Serialize + Sized {
    const PATH: &'static str;
    const METHOD: Method;

    fn to_request(&self) -> Result<StreamRequest, ClientError> {
        StreamRequest::new(Self::PATH, Self::METHOD, self)
    }
}

/// Conversational exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,
    /// Server-side scene configuration to use
    pub scene_code: String,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            scene_code: "chat".to_string(),
        }
    }

    pub fn with_scene_code(mut self, scene_code: impl Into<String>) -> Self {
        self.scene_code = scene_code.into();
        self
    }
}

impl Endpoint for ChatRequest {
    const PATH: &'static str = "/ai/chat/stream";
    const METHOD: Method = Method::Get;
}

/// Article generation from a topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateArticleRequest {
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl Endpoint for GenerateArticleRequest {
    const PATH: &'static str = "/article/ai/generate/stream";
    const METHOD: Method = Method::Get;
}

/// Rewrite of an existing article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeArticleRequest {
    pub title: String,
    pub content: String,
}

impl Endpoint for OptimizeArticleRequest {
    const PATH: &'static str = "/article/ai/optimize/stream";
    const METHOD: Method = Method::Post;
}

/// Revision of an article following reviewer instructions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectArticleRequest {
    pub title: String,
    pub content: String,
    pub correction: String,
}

impl Endpoint for CorrectArticleRequest {
    const PATH: &'static str = "/article/ai/correct/stream";
    const METHOD: Method = Method::Post;
}
