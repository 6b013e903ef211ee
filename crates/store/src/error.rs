use precheck_model::{Component, Version};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No snapshot for {component} {version}")]
    NotFound { version: Version, component: Component },

    #[error("Snapshot for {component} {version} already exists (use force to overwrite)")]
    Conflict { version: Version, component: Component },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Unsupported {artifact} schema_version {found} (expected {expected})")]
    Schema {
        artifact: &'static str,
        found: u32,
        expected: u32,
    },

    #[error("Lock error: {0}")]
    Lock(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
