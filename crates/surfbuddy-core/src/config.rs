use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StorageError;
use crate::storage::KeyValueStorage;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Storage key the single config record lives under.
pub const CONFIG_KEY: &str = "ollamaConfig";

/// The user's saved server and model choice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    #[serde(rename = "ollamaUrl")]
    pub server_url: String,
    #[serde(rename = "selectedModel")]
    pub selected_model: String,
}

impl OllamaConfig {
    pub fn new(server_url: impl Into<String>, selected_model: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            selected_model: selected_model.into(),
        }
    }
}

/// Reads and writes the [`OllamaConfig`] record.
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// `Ok(None)` if nothing was ever saved.
    pub async fn load(&self) -> Result<Option<OllamaConfig>, StorageError> {
        let Some(value) = self.storage.get(CONFIG_KEY).await? else {
            return Ok(None);
        };

        let config = serde_json::from_value(value).map_err(|source| StorageError::Value {
            key: CONFIG_KEY.to_string(),
            source,
        })?;
        Ok(Some(config))
    }

    pub async fn save(&self, config: &OllamaConfig) -> Result<(), StorageError> {
        let value = serde_json::to_value(config).map_err(|source| StorageError::Value {
            key: CONFIG_KEY.to_string(),
            source,
        })?;
        self.storage.set(CONFIG_KEY, value).await?;
        info!(
            server_url = %config.server_url,
            model = %config.selected_model,
            "saved configuration"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_before_save_is_absent() {
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = ConfigStore::new(Arc::new(FileStorage::new(&path)));

        let config = OllamaConfig::new("http://localhost:11434", "llama3");
        store.save(&config).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(config.clone()));

        let overwritten = OllamaConfig::new("http://gpu-box:11434", "mistral");
        store.save(&overwritten).await.unwrap();
        let reopened = ConfigStore::new(Arc::new(FileStorage::new(&path)));
        assert_eq!(reopened.load().await.unwrap(), Some(overwritten));
    }

    #[tokio::test]
    async fn test_persisted_layout() {
        let storage = Arc::new(MemoryStorage::new());
        let store = ConfigStore::new(storage.clone());
        store
            .save(&OllamaConfig::new("http://localhost:11434", "llama3"))
            .await
            .unwrap();

        let raw = storage.get(CONFIG_KEY).await.unwrap();
        assert_eq!(
            raw,
            Some(json!({"ollamaUrl": "http://localhost:11434", "selectedModel": "llama3"}))
        );
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_storage_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(CONFIG_KEY, json!({"url": 3})).await.unwrap();

        let store = ConfigStore::new(storage);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StorageError::Value { .. }));
    }
}
