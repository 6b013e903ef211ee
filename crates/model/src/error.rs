use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid version tag: {0}")]
    InvalidVersion(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Unknown component: {0}")]
    UnknownComponent(String),
}
