//! # Upgrade risk analysis
//!
//! Compares a live cluster against the knowledge base along an upgrade path.
//!
//! ```text
//! VersionStore ──> UpgradePlan::load (snapshots at both ends, forced path, renames, filters)
//!                        │
//! ClusterSnapshot ───────┴──> RiskAnalyzer::analyze ──> RiskReport
//!
//! P0  forced mutation not reflected by the cluster, or not observable
//! P1  default changed and the cluster still runs the old default,
//!     or a high-risk parameter is overridden
//! P2  parameter removed, renamed or retyped
//! ```
//!
//! P1 and P2 findings on names the filter table matches move to
//! `RiskReport::filtered`; P0 findings and high-risk names are never filtered.

mod analyzer;
mod error;
mod path;
mod plan;
mod report;

pub use analyzer::RiskAnalyzer;
pub use error::{AnalyzeError, Result};
pub use path::ForcedPath;
pub use plan::{SnapshotPair, UpgradePlan};
pub use report::{FilteredRecord, RiskReason, RiskRecord, RiskReport, RiskSummary, Severity};
