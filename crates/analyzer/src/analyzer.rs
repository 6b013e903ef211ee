use crate::plan::{SnapshotPair, UpgradePlan};
use crate::report::{FilteredRecord, RiskReason, RiskRecord, RiskReport, RiskSummary, Severity};
use precheck_model::{
    ClusterSnapshot, Component, FilterReason, ParameterKey, ParameterKind, RenameTable, Value,
};
use std::collections::{BTreeMap, BTreeSet};

const KINDS: [ParameterKind; 2] = [ParameterKind::Config, ParameterKind::SystemVariable];

/// Classifies configuration differences along an upgrade path.
///
/// Pure: everything it reads is in the plan and the cluster snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAnalyzer;

impl RiskAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, plan: &UpgradePlan, cluster: &ClusterSnapshot) -> RiskReport {
        let mut records = Vec::new();
        let forced_keys = self.forced_records(plan, cluster, &mut records);
        for (&component, pair) in &plan.snapshots {
            for kind in KINDS {
                self.default_records(plan, cluster, component, kind, pair, &forced_keys, &mut records);
                self.high_risk_records(plan, cluster, component, kind, pair, &forced_keys, &mut records);
            }
        }
        let (records, filtered) = partition_filtered(plan, resolve(records));
        let mut summary = RiskSummary::from_records(&records);
        summary.filtered = filtered.len();
        RiskReport {
            current: plan.current.clone(),
            target: plan.target.clone(),
            path: plan.path.clone(),
            from_bootstrap: plan.forced.from_bootstrap,
            to_bootstrap: plan.forced.to_bootstrap,
            summary,
            records,
            filtered,
            skipped_components: plan.skipped_components.clone(),
            unreachable_components: cluster.unreachable.clone(),
        }
    }

    /// P0 records; returns every forced key so default rules can skip them.
    fn forced_records(
        &self,
        plan: &UpgradePlan,
        cluster: &ClusterSnapshot,
        out: &mut Vec<RiskRecord>,
    ) -> BTreeSet<ParameterKey> {
        let mut covered = BTreeSet::new();
        for (key, last) in plan.forced.final_values(&plan.renames) {
            if !plan.components.contains(&key.component) {
                continue;
            }
            let name = key.name.clone();
            let order_sensitive = plan
                .snapshots
                .get(&key.component)
                .is_some_and(|pair| pair.target.is_order_sensitive(&name));
            let observed = cluster.observed(key.component, key.kind, &name);
            let reason = match observed {
                None => Some(RiskReason::Unverifiable),
                Some(value) if !value.equals(&last.to_value, order_sensitive) => {
                    Some(RiskReason::ForcedMismatch)
                }
                Some(_) => None,
            };
            if let Some(reason) = reason {
                out.push(RiskRecord {
                    parameter_name: name,
                    component: key.component,
                    kind: key.kind,
                    severity: Severity::P0,
                    expected: Some(last.to_value.clone()),
                    observed: observed.cloned(),
                    reason,
                    trace: plan.forced.steps_for(&key, &plan.renames).into_iter().cloned().collect(),
                });
            }
            covered.insert(key);
        }
        covered
    }

    /// P1 and P2 records for one component and kind.
    #[allow(clippy::too_many_arguments)]
    fn default_records(
        &self,
        plan: &UpgradePlan,
        cluster: &ClusterSnapshot,
        component: Component,
        kind: ParameterKind,
        pair: &SnapshotPair,
        forced: &BTreeSet<ParameterKey>,
        out: &mut Vec<RiskRecord>,
    ) {
        let current = canonical_values(&plan.renames, component, kind, pair.current.values(kind));
        let target = canonical_values(&plan.renames, component, kind, pair.target.values(kind));
        let record = |name: &str, severity, expected: Option<&Value>, observed: Option<&Value>, reason| RiskRecord {
            parameter_name: name.to_string(),
            component,
            kind,
            severity,
            expected: expected.cloned(),
            observed: observed.cloned(),
            reason,
            trace: Vec::new(),
        };

        for (name, &old) in &current {
            let observed = cluster.observed(component, kind, name);
            let Some(&new) = target.get(name) else {
                let renamed = plan
                    .renames
                    .renamed_in(component, kind, name, &plan.current, &plan.target);
                let reason = match renamed {
                    Some(to) => RiskReason::Renamed { to },
                    None => RiskReason::Removed,
                };
                out.push(record(name, Severity::P2, Some(old), observed, reason));
                continue;
            };

            if old.value_type() != new.value_type() {
                out.push(record(
                    name,
                    Severity::P2,
                    Some(new),
                    observed,
                    RiskReason::TypeChanged {
                        from: old.value_type(),
                        to: new.value_type(),
                    },
                ));
                continue;
            }

            let key = ParameterKey::new(component, kind, name.clone());
            let order_sensitive = pair.target.is_order_sensitive(name);
            if forced.contains(&key) || old.equals(new, order_sensitive) {
                continue;
            }
            // No observation: nothing shows the user kept the old default.
            if let Some(value) = observed {
                if value.equals(old, order_sensitive) {
                    out.push(record(name, Severity::P1, Some(new), Some(value), RiskReason::DefaultChanged));
                }
            }
        }
    }

    /// P1 records for overridden high-risk parameters outside the allowed values.
    #[allow(clippy::too_many_arguments)]
    fn high_risk_records(
        &self,
        plan: &UpgradePlan,
        cluster: &ClusterSnapshot,
        component: Component,
        kind: ParameterKind,
        pair: &SnapshotPair,
        forced: &BTreeSet<ParameterKey>,
        out: &mut Vec<RiskRecord>,
    ) {
        let defaults = canonical_values(&plan.renames, component, kind, pair.current.values(kind));
        for (name, entry) in plan.high_risk.entries(component, kind) {
            let name = plan.renames.canonicalize(component, kind, &name);
            if forced.contains(&ParameterKey::new(component, kind, name.clone())) {
                continue;
            }
            let Some(observed) = cluster.observed(component, kind, &name) else {
                continue;
            };
            let order_sensitive = pair.target.is_order_sensitive(&name);
            let default = defaults.get(&name).copied();
            if entry.allowed_values.iter().any(|allowed| observed.equals(allowed, order_sensitive)) {
                continue;
            }
            let overridden = match default {
                Some(default) => !observed.equals(default, order_sensitive),
                // Without a known default only an allow-list can judge the value.
                None => !entry.allowed_values.is_empty(),
            };
            if overridden {
                out.push(RiskRecord {
                    parameter_name: name,
                    component,
                    kind,
                    severity: Severity::P1,
                    expected: default.cloned(),
                    observed: Some(observed.clone()),
                    reason: RiskReason::HighRiskOverride {
                        note: entry.note.clone(),
                    },
                    trace: Vec::new(),
                });
            }
        }
    }
}

/// Move P1 and P2 findings on filtered names out of the report's records.
fn partition_filtered(plan: &UpgradePlan, records: Vec<RiskRecord>) -> (Vec<RiskRecord>, Vec<FilteredRecord>) {
    let mut kept = Vec::with_capacity(records.len());
    let mut filtered = Vec::new();
    for record in records {
        match filter_reason(plan, &record) {
            Some(filter) => filtered.push(FilteredRecord { record, filter }),
            None => kept.push(record),
        }
    }
    (kept, filtered)
}

fn filter_reason(plan: &UpgradePlan, record: &RiskRecord) -> Option<FilterReason> {
    if record.severity == Severity::P0 {
        return None;
    }
    let (component, kind) = (record.component, record.kind);
    let high_risk = plan
        .high_risk
        .entries(component, kind)
        .any(|(name, _)| plan.renames.canonicalize(component, kind, &name) == record.parameter_name);
    if high_risk {
        return None;
    }
    let reason = plan
        .filters
        .classify(component, kind, &record.parameter_name, &plan.target)?;
    match record.reason {
        RiskReason::DefaultChanged => Some(reason),
        _ => reason.hides_structural_changes().then_some(reason),
    }
}

fn canonical_values<'a>(
    renames: &RenameTable,
    component: Component,
    kind: ParameterKind,
    values: &'a BTreeMap<String, Value>,
) -> BTreeMap<String, &'a Value> {
    let mut out = BTreeMap::new();
    for (name, value) in values {
        out.entry(renames.canonicalize(component, kind, name))
            .or_insert(value);
    }
    out
}

/// Drop duplicates per (parameter, severity), let P0 suppress the lower tiers, then sort.
fn resolve(records: Vec<RiskRecord>) -> Vec<RiskRecord> {
    let p0: BTreeSet<(Component, ParameterKind, String)> = records
        .iter()
        .filter(|r| r.severity == Severity::P0)
        .map(|r| (r.component, r.kind, r.parameter_name.clone()))
        .collect();
    let mut seen = BTreeSet::new();
    let mut out: Vec<RiskRecord> = records
        .into_iter()
        .filter(|r| {
            r.severity == Severity::P0 || !p0.contains(&(r.component, r.kind, r.parameter_name.clone()))
        })
        .filter(|r| seen.insert((r.component, r.kind, r.parameter_name.clone(), r.severity)))
        .collect();
    out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    out
}
