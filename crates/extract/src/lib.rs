//! # Defaults extraction
//!
//! Reads one component checkout and produces its configuration defaults,
//! system variable defaults and bootstrap version, plus the forced
//! mutations declared by TiDB's upgrade functions.
//!
//! ## Strategies
//!
//! ```text
//! checkout
//!     │
//!     ├──> StaticExtractor (tree-sitter)
//!     │    ├─> Go: struct tags, composite literals, adjust*() calls, SysVar{} literals
//!     │    └─> Rust: serde attributes, impl Default bodies, ReadableSize/ReadableDuration
//!     │
//!     └──> ProbeExtractor (configured command printing JSON)
//!
//! bootstrap sources ──> extract_upgrade_logic ──> ForcedMutation[]
//! ```

mod error;
pub mod go;
mod language;
mod layout;
mod lit;
mod probe;
pub mod rust_source;
mod strategy;

pub use error::{ExtractError, Result};
pub use language::{ParsedFile, SourceLanguage};
pub use layout::SourceLayout;
pub use lit::{camel_to_snake, format_readable_size, kebab_case};
pub use probe::{parse_probe_output, ProbeExtractor, DEFAULT_PROBE_TIMEOUT};
pub use strategy::{
    extract_bootstrap_version, extract_upgrade_logic, DefaultsExtractor, ExtractedDefaults,
    StaticExtractor,
};
