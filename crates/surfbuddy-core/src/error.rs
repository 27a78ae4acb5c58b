use std::path::PathBuf;

use thiserror::Error;

/// Errors from talking to the Ollama server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The connection could not be established or timed out.
    #[error("could not reach Ollama server: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP error! status: {status}, message: {body}")]
    Status { status: u16, body: String },

    /// The server answered, but the body was not what the endpoint promises.
    #[error("unexpected response from Ollama server: {0}")]
    Malformed(String),
}

impl ClientError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Malformed(err.to_string())
        } else {
            ClientError::Network(err)
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// Server was reachable but its reply was an error status or unparseable.
    pub fn is_protocol(&self) -> bool {
        !self.is_network()
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors from the key/value storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("stored value for key {key:?} has the wrong shape: {source}")]
    Value {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not determine config directory")]
    NoConfigDir,
}

/// Why a save attempt did not go through.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("save is not allowed in the current state")]
    NotPermitted,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
