use crate::error::Result;
use precheck_model::{Component, ParameterKind, Value, Version, VersionSnapshot};
use precheck_store::VersionStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A version at which a parameter's default (or its type) changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePoint {
    pub version: Version,
    #[serde(flatten)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterHistory {
    pub introduced_in: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_in: Option<Version>,
    pub changes: Vec<ChangePoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentHistory {
    pub versions: Vec<Version>,
    #[serde(default)]
    pub config: BTreeMap<String, ParameterHistory>,
    #[serde(default)]
    pub system_variables: BTreeMap<String, ParameterHistory>,
}

impl ComponentHistory {
    pub fn parameters(&self, kind: ParameterKind) -> &BTreeMap<String, ParameterHistory> {
        match kind {
            ParameterKind::Config => &self.config,
            ParameterKind::SystemVariable => &self.system_variables,
        }
    }

    fn parameters_mut(&mut self, kind: ParameterKind) -> &mut BTreeMap<String, ParameterHistory> {
        match kind {
            ParameterKind::Config => &mut self.config,
            ParameterKind::SystemVariable => &mut self.system_variables,
        }
    }
}

/// Body of `parameters_history.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    pub components: BTreeMap<Component, ComponentHistory>,
}

/// Fold one component's snapshots into per-parameter change points.
pub fn fold_history(snapshots: &[VersionSnapshot]) -> ComponentHistory {
    let mut ordered: Vec<&VersionSnapshot> = snapshots.iter().collect();
    ordered.sort_by(|a, b| a.version.cmp(&b.version));

    let mut history = ComponentHistory {
        versions: ordered.iter().map(|s| s.version.clone()).collect(),
        ..Default::default()
    };
    for kind in [ParameterKind::Config, ParameterKind::SystemVariable] {
        let mut previous: BTreeMap<&str, &Value> = BTreeMap::new();
        for snapshot in &ordered {
            let current = snapshot.values(kind);
            let params = history.parameters_mut(kind);
            for (name, value) in current {
                let entry = params.entry(name.clone()).or_insert_with(|| ParameterHistory {
                    introduced_in: snapshot.version.clone(),
                    removed_in: None,
                    changes: Vec::new(),
                });
                let reappeared = entry.removed_in.take().is_some();
                if reappeared || previous.get(name.as_str()) != Some(&value) {
                    entry.changes.push(ChangePoint {
                        version: snapshot.version.clone(),
                        value: value.clone(),
                    });
                }
            }
            for name in previous.keys() {
                if !current.contains_key(*name) {
                    if let Some(entry) = params.get_mut(*name) {
                        entry.removed_in = Some(snapshot.version.clone());
                    }
                }
            }
            previous = current.iter().map(|(k, v)| (k.as_str(), v)).collect();
        }
    }
    history
}

/// Read every stored snapshot of `components` and write `parameters_history.json`.
pub async fn aggregate_history(
    store: &VersionStore,
    components: &[Component],
) -> Result<(HistoryDocument, PathBuf)> {
    let mut document = HistoryDocument::default();
    for &component in components {
        let versions = store.list_versions(component).await?;
        if versions.is_empty() {
            continue;
        }
        let mut snapshots = Vec::with_capacity(versions.len());
        for version in &versions {
            match store.get(version, component).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => log::warn!("Skipping {component} {version} in history: {err}"),
            }
        }
        let history = fold_history(&snapshots);
        log::info!(
            "{component}: {} versions, {} config items, {} system variables",
            history.versions.len(),
            history.config.len(),
            history.system_variables.len()
        );
        document.components.insert(component, history);
    }
    let path = store.write_history(&document).await?;
    Ok((document, path))
}
