use crate::error::{AnalyzeError, Result};
use crate::path::ForcedPath;
use precheck_model::{
    Component, FilterTable, HighRiskTable, RenameTable, UpgradeLogicSet, Version, VersionSnapshot,
};
use precheck_store::VersionStore;
use std::collections::{BTreeMap, BTreeSet};

/// Defaults of one component at both ends of the upgrade.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPair {
    pub current: VersionSnapshot,
    pub target: VersionSnapshot,
}

/// Everything the analyzer needs, loaded up front.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePlan {
    pub current: Version,
    pub target: Version,
    /// Known releases in `(current, target]`, ascending.
    pub path: Vec<Version>,
    pub components: BTreeSet<Component>,
    pub snapshots: BTreeMap<Component, SnapshotPair>,
    pub forced: ForcedPath,
    pub renames: RenameTable,
    /// Names kept out of P1 and P2 findings.
    pub filters: FilterTable,
    pub high_risk: HighRiskTable,
    /// Components left out of default comparison, with the reason.
    pub skipped_components: BTreeMap<Component, String>,
}

impl UpgradePlan {
    /// Read snapshots, upgrade logic and the rename, filter and high-risk tables for `current -> target`.
    ///
    /// Missing snapshots are not errors: the component is skipped and logged.
    pub async fn load(
        store: &VersionStore,
        components: &[Component],
        current: &Version,
        target: &Version,
    ) -> Result<Self> {
        if current >= target {
            return Err(AnalyzeError::InvalidPath {
                current: current.clone(),
                target: target.clone(),
            });
        }

        let mut snapshots = BTreeMap::new();
        let mut skipped = BTreeMap::new();
        let mut known: BTreeSet<Version> = BTreeSet::new();
        for &component in components {
            known.extend(store.list_versions(component).await?);
            let pair = (
                load_optional(store, current, component).await?,
                load_optional(store, target, component).await?,
            );
            match pair {
                (Some(current), Some(target)) => {
                    snapshots.insert(component, SnapshotPair { current, target });
                }
                (current_snap, _) => {
                    let missing = if current_snap.is_none() { current } else { target };
                    let reason = format!("no {component} snapshot for {missing} in the knowledge base");
                    log::warn!("Skipping {component}: {reason}");
                    skipped.insert(component, reason);
                }
            }
        }

        let mut path: Vec<Version> = known
            .into_iter()
            .filter(|v| v > current && v <= target)
            .collect();
        if path.last() != Some(target) {
            path.push(target.clone());
        }

        let logic = store.get_upgrade_logic().await?;
        let bootstrap = match primary_bootstrap(&snapshots) {
            Some(bounds) => Some(bounds),
            None => stored_bootstrap(store, current, target).await?,
        };
        if bootstrap.is_none() && !logic.is_empty() {
            log::warn!(
                "Bootstrap version of {current} or {target} is unknown; forced mutations are not evaluated"
            );
        }
        let forced = forced_path(&logic, bootstrap);

        Ok(Self {
            current: current.clone(),
            target: target.clone(),
            path,
            components: components.iter().copied().collect(),
            snapshots,
            forced,
            renames: store.rename_table().await?,
            filters: store.filter_table().await?,
            high_risk: store.high_risk_table().await?,
            skipped_components: skipped,
        })
    }

    /// Assemble a plan from in-memory parts, with no filters and no high-risk list.
    pub fn from_parts(
        current: Version,
        target: Version,
        snapshots: BTreeMap<Component, SnapshotPair>,
        logic: &UpgradeLogicSet,
        renames: RenameTable,
    ) -> Self {
        let forced = forced_path(logic, primary_bootstrap(&snapshots));
        Self {
            path: vec![target.clone()],
            current,
            target,
            components: snapshots.keys().copied().collect(),
            snapshots,
            forced,
            renames,
            filters: FilterTable::default(),
            high_risk: HighRiskTable::default(),
            skipped_components: BTreeMap::new(),
        }
    }

    pub fn with_filters(mut self, filters: FilterTable) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_high_risk(mut self, high_risk: HighRiskTable) -> Self {
        self.high_risk = high_risk;
        self
    }
}

async fn load_optional(
    store: &VersionStore,
    version: &Version,
    component: Component,
) -> Result<Option<VersionSnapshot>> {
    match store.get(version, component).await {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Bootstrap versions at both ends, read from the primary component's loaded pair.
fn primary_bootstrap(loaded: &BTreeMap<Component, SnapshotPair>) -> Option<(i64, i64)> {
    loaded
        .get(&Component::TiDB)
        .map(|pair| (pair.current.bootstrap_version, pair.target.bootstrap_version))
}

/// Same as `primary_bootstrap` when the primary component was not requested.
async fn stored_bootstrap(
    store: &VersionStore,
    current: &Version,
    target: &Version,
) -> Result<Option<(i64, i64)>> {
    let from = load_optional(store, current, Component::TiDB).await?;
    let to = load_optional(store, target, Component::TiDB).await?;
    Ok(from
        .zip(to)
        .map(|(from, to)| (from.bootstrap_version, to.bootstrap_version)))
}

fn forced_path(logic: &UpgradeLogicSet, bootstrap: Option<(i64, i64)>) -> ForcedPath {
    match bootstrap {
        Some((from, to)) => ForcedPath::between(logic, from, to),
        None => ForcedPath::default(),
    }
}
