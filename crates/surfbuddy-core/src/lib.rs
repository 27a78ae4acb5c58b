pub mod chat;
pub mod config;
pub mod connection;
pub mod debounce;
pub mod error;
pub mod ollama;
pub mod storage;

// Re-export main types for convenience
pub use chat::{ChatMessage, ChatRole, ChatSession, PendingPrompt};
pub use config::{ConfigStore, OllamaConfig, DEFAULT_OLLAMA_URL};
pub use connection::{
    ConnectionController, ConnectionState, ControllerOptions, ModelStatus, SaveStatus, Ticket,
};
pub use debounce::{DebounceTimer, Debouncer};
pub use error::{ClientError, SaveError, StorageError};
pub use ollama::{InferenceBackend, ModelDescriptor, OllamaClient, NO_MESSAGE_SENTINEL};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
