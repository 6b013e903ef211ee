//! Shared parameter model for the upgrade precheck workspace
//!
//! Typed values, release versions, per-version default snapshots, forced
//! upgrade mutations, runtime observations and the rename table that maps
//! historical spellings onto one parameter identity, plus the filter and
//! high-risk tables that shape what the analyzer reports.

pub mod component;
pub mod duration;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod mutation;
pub mod rename;
pub mod runtime;
pub mod snapshot;
pub mod value;
pub mod version;

pub use component::{Component, ParameterKey, ParameterKind};
pub use duration::DurationValue;
pub use error::{ModelError, Result};
pub use filter::{FilterReason, FilterRule, FilterTable, HighRiskParameter, HighRiskTable, NamePattern};
pub use flatten::flatten_json;
pub use mutation::{ForcedMutation, UpgradeLogicSet};
pub use rename::{normalize_spelling, RenameRule, RenameTable};
pub use runtime::{ClusterSnapshot, RuntimeSnapshot};
pub use snapshot::{ExtractionMethod, VersionSnapshot};
pub use value::{parse_bool_word, Value, ValueType};
pub use version::Version;

/// Milliseconds since the Unix epoch, zero if the clock is before it.
pub fn current_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
