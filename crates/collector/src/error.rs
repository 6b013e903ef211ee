use precheck_model::Component;
use precheck_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectError>;

#[derive(Error, Debug)]
pub enum CollectError {
    /// No configured address answered; the component is left out of the snapshot.
    #[error("{component} unreachable ({addresses}): {message}")]
    Unreachable {
        component: Component,
        addresses: String,
        message: String,
    },

    #[error("No address configured for {0}")]
    NoAddress(Component),

    #[error("GET {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("SQL error at {address}: {message}")]
    Sql { address: String, message: String },

    #[error("Invalid address `{0}`")]
    InvalidAddress(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CollectError {
    pub fn unreachable(component: Component, addresses: &[String], message: impl Into<String>) -> Self {
        Self::Unreachable {
            component,
            addresses: addresses.join(", "),
            message: message.into(),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, CollectError::Unreachable { .. } | CollectError::NoAddress(_))
    }
}
