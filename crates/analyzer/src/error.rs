use precheck_model::Version;
use precheck_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyzeError>;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Target {target} is not newer than current {current}")]
    InvalidPath { current: Version, target: Version },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
