pub mod gcs;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use log::{ debug, info, warn };
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;

/// Well-known name of the single persisted persona document.
pub const CONFIG_OBJECT_NAME: &str = "shadow_config.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Persistence unavailable: no cloud storage backend is configured")]
    Unavailable,
    #[error("Storage request failed with status {status}: {message}")]
    Http {
        status: u16,
        message: String,
    },
    #[error("Storage transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Storage authentication failed: {0}")]
    Auth(String),
    #[error("Could not create bucket '{bucket}': {reason}")]
    BucketCreate {
        bucket: String,
        reason: String,
    },
    #[error("Invalid storage URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single bucket in some object store.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    fn bucket(&self) -> &str;

    /// Human-readable address of an object, e.g. `gs://bucket/name`.
    fn location(&self, name: &str) -> String;

    async fn object_exists(&self, name: &str) -> Result<bool, StoreError>;

    async fn read_object(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    async fn write_object(
        &self,
        name: &str,
        body: Vec<u8>,
        content_type: &str
    ) -> Result<(), StoreError>;

    async fn bucket_exists(&self) -> Result<bool, StoreError>;

    async fn create_bucket(&self) -> Result<(), StoreError>;
}

/// Reads degrade to a local copy of the document; writes only ever go to the
/// bucket. Concurrent saves are not serialized, the last one to land wins.
pub struct PersonaStore {
    backend: Option<Arc<dyn ObjectBackend>>,
    local_path: PathBuf,
}

impl PersonaStore {
    pub fn new(backend: Option<Arc<dyn ObjectBackend>>, local_path: impl Into<PathBuf>) -> Self {
        Self { backend, local_path: local_path.into() }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn bucket(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.bucket())
    }

    /// The stored document, or `None` when neither the bucket nor the local copy has it.
    pub async fn get(&self) -> Option<JsonValue> {
        if let Some(backend) = &self.backend {
            match Self::read_remote(backend.as_ref()).await {
                Ok(Some(doc)) => {
                    debug!("Loaded persona document from {}", backend.location(CONFIG_OBJECT_NAME));
                    return Some(doc);
                }
                Ok(None) => {
                    info!(
                        "{} not present in bucket. Falling back to local copy at {}",
                        CONFIG_OBJECT_NAME,
                        self.local_path.display()
                    );
                }
                Err(e) => {
                    warn!(
                        "Failed to read {} from bucket: {}. Falling back to local copy at {}",
                        CONFIG_OBJECT_NAME,
                        e,
                        self.local_path.display()
                    );
                }
            }
        }
        self.read_local().await
    }

    async fn read_remote(backend: &dyn ObjectBackend) -> Result<Option<JsonValue>, StoreError> {
        if !backend.object_exists(CONFIG_OBJECT_NAME).await? {
            return Ok(None);
        }
        let bytes = backend.read_object(CONFIG_OBJECT_NAME).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn read_local(&self) -> Option<JsonValue> {
        let bytes = match tokio::fs::read(&self.local_path).await {
            Ok(b) => b,
            Err(e) => {
                debug!("No local persona document at {}: {}", self.local_path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Local persona document {} is not valid JSON: {}", self.local_path.display(), e);
                None
            }
        }
    }

    /// Overwrites the stored document and returns where it landed.
    pub async fn put(&self, document: &JsonValue) -> Result<String, StoreError> {
        let backend = self.backend.as_ref().ok_or(StoreError::Unavailable)?;

        if !backend.bucket_exists().await? {
            warn!("Target bucket does not exist. Creating it before saving.");
            backend.create_bucket().await?;
        }

        let body = serde_json::to_vec_pretty(document)?;
        backend.write_object(CONFIG_OBJECT_NAME, body, "application/json").await?;

        let location = backend.location(CONFIG_OBJECT_NAME);
        info!("Persona document saved to {}", location);
        Ok(location)
    }
}

pub async fn initialize_store(args: &Args) -> PersonaStore {
    let backend: Option<Arc<dyn ObjectBackend>> = match gcs::GcsBackend::connect(args).await {
        Ok(backend) => {
            info!("Persona document will be stored in bucket: {}", args.bucket_name);
            Some(Arc::new(backend))
        }
        Err(e) => {
            warn!(
                "Cloud storage unavailable ({}). Reads fall back to {}; saves are disabled.",
                e,
                args.local_config_path.display()
            );
            None
        }
    };
    PersonaStore::new(backend, args.local_config_path.clone())
}
