use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Shown in place of a reply when the server answers without any content.
pub const NO_MESSAGE_SENTINEL: &str = "No message returned";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(300);

const BYTE_UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Option<Vec<ModelDescriptor>>,
}

/// One model known to the Ollama server, as reported by `/api/tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Everything else the server sent; not interpreted.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            digest: None,
            metadata: Map::new(),
        }
    }

    /// Human readable size, e.g. `4GiB`.
    pub fn size_label(&self) -> Option<String> {
        let mut value = self.size?;
        let mut order = 0;
        while value >= 1024 && order < BYTE_UNITS.len() - 1 {
            value /= 1024;
            order += 1;
        }
        Some(format!("{}{}", value, BYTE_UNITS[order]))
    }
}

/// The remote calls the connection workflow and the chat view depend on.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// True iff `GET /api/tags` answers with a success status. Never fails.
    async fn probe_connection(&self, server_url: &str) -> bool;

    async fn list_models(&self, server_url: &str) -> Result<Vec<ModelDescriptor>, ClientError>;

    /// One non-streaming chat completion with a single user message.
    async fn send_chat_prompt(
        &self,
        server_url: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, ClientError>;
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    request_timeout: Duration,
    chat_timeout: Duration,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaClient {
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_REQUEST_TIMEOUT, DEFAULT_CHAT_TIMEOUT)
    }

    pub fn with_timeouts(request_timeout: Duration, chat_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            request_timeout,
            chat_timeout,
        }
    }

    fn tags_request(&self, server_url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(endpoint(server_url, "api/tags"))
            .header(ACCEPT, "application/json")
            .timeout(self.request_timeout)
    }
}

fn endpoint(server_url: &str, path: &str) -> String {
    format!("{}/{}", server_url.trim_end_matches('/'), path)
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn probe_connection(&self, server_url: &str) -> bool {
        match self.tags_request(server_url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(server_url, status = %response.status(), "connection probe rejected");
                false
            }
            Err(e) => {
                warn!(server_url, error = %e, "connection probe failed");
                false
            }
        }
    }

    async fn list_models(&self, server_url: &str) -> Result<Vec<ModelDescriptor>, ClientError> {
        let response = self
            .tags_request(server_url)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        let response = error_for_status(response).await?;

        let body = response.text().await.map_err(ClientError::from_reqwest)?;
        let parsed: ModelsResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Malformed(e.to_string()))?;
        let models = parsed.models.unwrap_or_default();
        debug!(server_url, count = models.len(), "fetched models");
        Ok(models)
    }

    async fn send_chat_prompt(
        &self,
        server_url: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, ClientError> {
        let request = ChatRequest {
            model,
            messages: [WireMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self
            .client
            .post(endpoint(server_url, "api/chat"))
            .header(ACCEPT, "application/json")
            .timeout(self.chat_timeout)
            .json(&request)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        let response = match error_for_status(response).await {
            Ok(response) => response,
            Err(e) => {
                warn!(server_url, model, error = %e, "chat request rejected");
                return Err(e);
            }
        };

        let body = response.text().await.map_err(ClientError::from_reqwest)?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Malformed(e.to_string()))?;

        match parsed.message.and_then(|m| m.content).filter(|c| !c.is_empty()) {
            Some(content) => Ok(content),
            None => {
                warn!(server_url, model, "chat response had no content");
                Ok(NO_MESSAGE_SENTINEL.to_string())
            }
        }
    }
}
