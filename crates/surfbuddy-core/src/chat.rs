//! UI-agnostic chat transcript.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ConfigStore, OllamaConfig};
use crate::error::ClientError;
use crate::ollama::InferenceBackend;

pub const GREETING: &str =
    "Hello! I can help you understand these search results better. What would you like to know?";
pub const CONFIGURE_FIRST: &str = "Please configure Ollama settings first.";

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// A prompt accepted by the session and waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPrompt {
    pub config: OllamaConfig,
    pub prompt: String,
}

impl PendingPrompt {
    pub async fn send(&self, backend: &dyn InferenceBackend) -> Result<String, ClientError> {
        backend
            .send_chat_prompt(
                &self.config.server_url,
                &self.config.selected_model,
                &self.prompt,
            )
            .await
    }
}

/// One chat session. The transcript only grows.
#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    config: Option<OllamaConfig>,
    loading: bool,
}

impl ChatSession {
    pub fn new(config: Option<OllamaConfig>) -> Self {
        let greeting = if config.is_some() {
            GREETING
        } else {
            CONFIGURE_FIRST
        };
        Self {
            messages: vec![ChatMessage::new(ChatRole::System, greeting)],
            config,
            loading: false,
        }
    }

    /// Starts a session from the saved config; a failed load counts as
    /// "not configured".
    pub async fn open(store: &ConfigStore) -> Self {
        let config = store.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "error loading config for chat");
            None
        });
        Self::new(config)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn config(&self) -> Option<&OllamaConfig> {
        self.config.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn can_send(&self) -> bool {
        self.config.is_some() && !self.loading
    }

    /// Config saved elsewhere after this session started.
    pub fn set_config(&mut self, config: OllamaConfig) {
        self.config = Some(config);
    }

    /// Records the user's message and returns the prompt to send, or `None`
    /// if the input is blank, a reply is outstanding, or nothing is
    /// configured.
    pub fn submit(&mut self, input: &str) -> Option<PendingPrompt> {
        let prompt = input.trim();
        if prompt.is_empty() || !self.can_send() {
            return None;
        }
        let config = self.config.clone()?;

        self.messages.push(ChatMessage::new(ChatRole::User, prompt));
        self.loading = true;
        Some(PendingPrompt {
            config,
            prompt: prompt.to_string(),
        })
    }

    /// Appends the reply, or the failure as an inline system message.
    pub fn complete(&mut self, result: Result<String, ClientError>) {
        self.loading = false;
        match result {
            Ok(reply) if reply.is_empty() => {}
            Ok(reply) => self.messages.push(ChatMessage::new(ChatRole::Assistant, reply)),
            Err(e) => {
                warn!(error = %e, "chat request failed");
                self.messages
                    .push(ChatMessage::new(ChatRole::System, format!("Error: {e}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn configured() -> ChatSession {
        ChatSession::new(Some(OllamaConfig::new("http://localhost:11434", "llama3")))
    }

    #[test]
    fn test_greeting_depends_on_config() {
        assert_eq!(configured().messages()[0].content, GREETING);
        let unconfigured = ChatSession::new(None);
        assert_eq!(
            unconfigured.messages(),
            &[ChatMessage::new(ChatRole::System, CONFIGURE_FIRST)]
        );
    }

    #[test]
    fn test_submit_requires_config_and_text() {
        let mut unconfigured = ChatSession::new(None);
        assert_eq!(unconfigured.submit("hello"), None);

        let mut session = configured();
        assert_eq!(session.submit("   "), None);
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_submit_then_reply() {
        let mut session = configured();
        let pending = session.submit("  hello ").unwrap();
        assert_eq!(pending.prompt, "hello");
        assert_eq!(pending.config.selected_model, "llama3");
        assert!(session.is_loading());

        // One outstanding prompt at a time.
        assert_eq!(session.submit("again"), None);

        session.complete(Ok("hi there".to_string()));
        assert!(!session.is_loading());
        let tail: Vec<_> = session.messages()[1..].to_vec();
        assert_eq!(
            tail,
            vec![
                ChatMessage::new(ChatRole::User, "hello"),
                ChatMessage::new(ChatRole::Assistant, "hi there"),
            ]
        );
    }

    #[test]
    fn test_failure_becomes_inline_system_message() {
        let mut session = configured();
        session.submit("hello").unwrap();
        session.complete(Err(ClientError::Status {
            status: 500,
            body: "model not found".to_string(),
        }));

        let last = session.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::System);
        assert_eq!(
            last.content,
            "Error: HTTP error! status: 500, message: model not found"
        );
        assert!(session.can_send());
    }

    #[tokio::test]
    async fn test_open_reads_saved_config() {
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        assert!(ChatSession::open(&store).await.config().is_none());

        let config = OllamaConfig::new("http://localhost:11434", "llama3");
        store.save(&config).await.unwrap();
        let session = ChatSession::open(&store).await;
        assert_eq!(session.config(), Some(&config));
        assert_eq!(session.messages()[0].content, GREETING);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::new(ChatRole::Assistant, "x")).unwrap();
        assert!(json.contains("\"assistant\""));
    }
}
