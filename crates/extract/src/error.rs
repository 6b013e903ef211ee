use precheck_model::Component;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors raised while extracting defaults or upgrade logic from one source tree
#[derive(Error, Debug)]
pub enum ExtractError {
    /// None of the candidate source files exist in this tree
    #[error("No {what} source found for {component} under {root}")]
    MissingSource {
        component: Component,
        what: &'static str,
        root: PathBuf,
    },

    /// Source was found but could not be parsed
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Tree-sitter error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    /// The probe command failed or produced unusable output
    #[error("Probe error: {0}")]
    Probe(String),

    /// The probe command exceeded its time budget
    #[error("Probe timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Extraction produced nothing usable
    #[error("No parameters extracted for {0}")]
    Empty(Component),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ExtractError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitter(msg.into())
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }
}
