//! # Knowledge base builder
//!
//! Turns component source repositories into the per-version default snapshots
//! and the shared upgrade logic stored by `precheck-store`.
//!
//! ## Pipeline
//!
//! ```text
//! tags ──> resolve_targets (single / range / release lines, start/stop bounds)
//!   │
//!   ├──> upgrade logic (once, trunk checkout of the primary component)
//!   │
//!   └──> JoinSet bounded by a semaphore
//!          └─> lease worktree ─> checkout tag ─> DefaultsExtractor ─> VersionStore::put
//!
//! outcomes ──> ledger + GenerationReport
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use precheck_builder::{GenerateOptions, Generator, VersionBounds, VersionSelection};
//! use precheck_store::VersionStore;
//!
//! # async fn run(sources: Vec<precheck_builder::ComponentSource>) -> precheck_builder::Result<()> {
//! let store = VersionStore::open("knowledge").await?;
//! let generator = Generator::new(store, sources, GenerateOptions::default());
//! let selection = VersionSelection::Auto { release_lines: vec!["v7.1".into()] };
//! let report = generator.run(&selection, &VersionBounds::default()).await?;
//! println!("{} generated", report.summary.generated);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod generator;
pub mod git;
mod history;
mod limits;
mod report;
mod source;
mod targets;
mod worktree;

pub use config::{
    BuilderConfig, ExtractionStrategy, RepositoryConfig, RepositoryLayout, CONFIG_FILE_NAME,
};
pub use error::{BuildError, Result};
pub use generator::{sources_from_config, ComponentSource, GenerateOptions, Generator};
pub use history::{
    aggregate_history, fold_history, ChangePoint, ComponentHistory, HistoryDocument,
    ParameterHistory,
};
pub use limits::{default_generate_concurrency, resolve_generate_concurrency, GENERATE_CONCURRENCY_ENV};
pub use report::{GenerationReport, ReportSummary, TaskOutcome, TaskStatus, UpgradeLogicOutcome};
pub use source::{Checkout, DirectorySourceTree, GitSourceTree, SourceTree};
pub use targets::{parse_tags, resolve_targets, VersionBounds, VersionSelection};
pub use worktree::{WorktreeLease, WorktreePool};
