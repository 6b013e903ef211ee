use precheck_model::{Component, Version};
use serde::Serialize;
use std::collections::BTreeSet;

/// What happened to one (version, component) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Generated { digest: String, parameters: usize },
    /// Already in the ledger and skip-existing was requested.
    Skipped,
    /// A snapshot exists and force was not requested; it was left untouched.
    Conflict,
    Failed { reason: String },
}

impl TaskStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub version: Version,
    pub component: Component,
    #[serde(flatten)]
    pub status: TaskStatus,
}

/// Result of the once-per-run upgrade logic extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpgradeLogicOutcome {
    Appended { added: usize, total: usize },
    NotConfigured,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReportSummary {
    pub generated: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub failed: usize,
}

/// Per-version outcome list of a generation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub requested: Vec<Version>,
    pub upgrade_logic: UpgradeLogicOutcome,
    pub outcomes: Vec<TaskOutcome>,
    pub summary: ReportSummary,
}

impl GenerationReport {
    pub fn new(requested: Vec<Version>, upgrade_logic: UpgradeLogicOutcome, mut outcomes: Vec<TaskOutcome>) -> Self {
        outcomes.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.component.cmp(&b.component))
        });
        let mut summary = ReportSummary::default();
        for outcome in &outcomes {
            match outcome.status {
                TaskStatus::Generated { .. } => summary.generated += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Conflict => summary.conflicts += 1,
                TaskStatus::Failed { .. } => summary.failed += 1,
            }
        }
        Self {
            requested,
            upgrade_logic,
            outcomes,
            summary,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failure())
    }

    /// Versions for which every component failed.
    pub fn failed_versions(&self) -> Vec<Version> {
        let ok: BTreeSet<&Version> = self
            .outcomes
            .iter()
            .filter(|o| !o.status.is_failure())
            .map(|o| &o.version)
            .collect();
        self.requested
            .iter()
            .filter(|v| !ok.contains(v))
            .cloned()
            .collect()
    }

    /// Whether at least one requested version succeeded or was skipped.
    pub fn any_version_ok(&self) -> bool {
        self.failed_versions().len() < self.requested.len()
    }

    /// 0 when some version succeeded (or nothing was requested), 1 when every version failed.
    pub fn exit_code(&self) -> i32 {
        if self.requested.is_empty() || self.any_version_ok() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(v: &str, component: Component, status: TaskStatus) -> TaskOutcome {
        TaskOutcome {
            version: Version::parse(v).unwrap(),
            component,
            status,
        }
    }

    #[test]
    fn exit_code_follows_version_outcomes() {
        let failed = || TaskStatus::Failed { reason: "boom".into() };
        let requested = vec![Version::parse("v7.1.0").unwrap(), Version::parse("v7.5.0").unwrap()];

        let all_failed = GenerationReport::new(
            requested.clone(),
            UpgradeLogicOutcome::NotConfigured,
            vec![
                outcome("v7.1.0", Component::TiDB, failed()),
                outcome("v7.5.0", Component::TiDB, failed()),
            ],
        );
        assert_eq!(all_failed.exit_code(), 1);
        assert_eq!(all_failed.summary.failed, 2);

        let partial = GenerationReport::new(
            requested,
            UpgradeLogicOutcome::NotConfigured,
            vec![
                outcome("v7.5.0", Component::TiDB, failed()),
                outcome("v7.1.0", Component::TiDB, TaskStatus::Skipped),
            ],
        );
        assert_eq!(partial.exit_code(), 0);
        assert_eq!(partial.failed_versions(), vec![Version::parse("v7.5.0").unwrap()]);
        assert_eq!(partial.outcomes[0].version, Version::parse("v7.1.0").unwrap());
    }

    #[test]
    fn outcome_serializes_flat() {
        let json = serde_json::to_value(outcome(
            "v7.1.0",
            Component::PD,
            TaskStatus::Failed { reason: "no source".into() },
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"version": "v7.1.0", "component": "pd", "status": "failed", "reason": "no source"})
        );
    }
}
