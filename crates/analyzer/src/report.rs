use precheck_model::{
    Component, FilterReason, ForcedMutation, ParameterKind, Value, ValueType, Version,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// A forced mutation the cluster does not reflect, or cannot be checked.
    P0,
    /// A silently changing default the user never overrode, or an
    /// overridden high-risk parameter.
    P1,
    /// Removed, renamed or retyped parameter.
    P2,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::P0 => "P0",
            Severity::P1 => "P1",
            Severity::P2 => "P2",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RiskReason {
    ForcedMismatch,
    Unverifiable,
    DefaultChanged,
    HighRiskOverride {
        #[serde(skip_serializing_if = "String::is_empty")]
        note: String,
    },
    Removed,
    Renamed { to: String },
    TypeChanged { from: ValueType, to: ValueType },
}

impl RiskReason {
    /// Position within a severity tier when names tie.
    fn rank(&self) -> u8 {
        match self {
            RiskReason::ForcedMismatch => 0,
            RiskReason::Unverifiable => 1,
            RiskReason::DefaultChanged => 2,
            RiskReason::HighRiskOverride { .. } => 3,
            RiskReason::Removed => 4,
            RiskReason::Renamed { .. } => 5,
            RiskReason::TypeChanged { .. } => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskRecord {
    pub parameter_name: String,
    pub component: Component,
    pub kind: ParameterKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<Value>,
    #[serde(flatten)]
    pub reason: RiskReason,
    /// Every forced mutation on this parameter along the path.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<ForcedMutation>,
}

impl RiskRecord {
    pub(crate) fn sort_key(&self) -> (Severity, &str, Component, ParameterKind, u8) {
        (
            self.severity,
            self.parameter_name.as_str(),
            self.component,
            self.kind,
            self.reason.rank(),
        )
    }
}

/// A finding the filter table kept out of `records`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredRecord {
    #[serde(flatten)]
    pub record: RiskRecord,
    pub filter: FilterReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskSummary {
    pub p0: usize,
    pub p1: usize,
    pub p2: usize,
    pub total: usize,
    pub filtered: usize,
}

impl RiskSummary {
    pub fn from_records(records: &[RiskRecord]) -> Self {
        let mut summary = RiskSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.severity {
                Severity::P0 => summary.p0 += 1,
                Severity::P1 => summary.p1 += 1,
                Severity::P2 => summary.p2 += 1,
            }
        }
        summary
    }
}

/// Analyzer output, rendered elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
    pub current: Version,
    pub target: Version,
    pub path: Vec<Version>,
    pub from_bootstrap: i64,
    pub to_bootstrap: i64,
    pub records: Vec<RiskRecord>,
    pub summary: RiskSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filtered: Vec<FilteredRecord>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub skipped_components: BTreeMap<Component, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unreachable_components: BTreeMap<Component, String>,
}

impl RiskReport {
    pub fn records_at(&self, severity: Severity) -> impl Iterator<Item = &RiskRecord> {
        self.records.iter().filter(move |r| r.severity == severity)
    }
}
