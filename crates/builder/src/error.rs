use precheck_extract::ExtractError;
use precheck_model::{Component, Version};
use precheck_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Error, Debug)]
pub enum BuildError {
    /// No configured component repository is usable; the whole run stops.
    #[error("No usable source repository: {0}")]
    RepositoryUnavailable(String),

    #[error("Extraction failed for {component} {version}: {source}")]
    Extraction {
        version: Version,
        component: Component,
        #[source]
        source: ExtractError,
    },

    #[error("git {command} failed in {repo}: {message}")]
    Git {
        command: String,
        repo: PathBuf,
        message: String,
    },

    #[error("{component} {version} did not finish within {after:?}")]
    Timeout {
        version: Version,
        component: Component,
        after: std::time::Duration,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl BuildError {
    pub fn git(command: impl Into<String>, repo: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Git {
            command: command.into(),
            repo: repo.into(),
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BuildError::RepositoryUnavailable(_))
    }
}
