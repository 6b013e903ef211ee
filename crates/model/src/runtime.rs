use crate::component::{Component, ParameterKind};
use crate::value::Value;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration observed on a live component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub collected_at_unix_ms: u64,
    pub component: Component,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_version: Option<Version>,
    /// Address that answered.
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    #[serde(default)]
    pub system_variables: BTreeMap<String, Value>,
}

impl RuntimeSnapshot {
    pub fn new(component: Component, address: impl Into<String>, collected_at_unix_ms: u64) -> Self {
        Self {
            collected_at_unix_ms,
            component,
            reported_version: None,
            address: address.into(),
            config: BTreeMap::new(),
            system_variables: BTreeMap::new(),
        }
    }

    pub fn values(&self, kind: ParameterKind) -> &BTreeMap<String, Value> {
        match kind {
            ParameterKind::Config => &self.config,
            ParameterKind::SystemVariable => &self.system_variables,
        }
    }

    pub fn values_mut(&mut self, kind: ParameterKind) -> &mut BTreeMap<String, Value> {
        match kind {
            ParameterKind::Config => &mut self.config,
            ParameterKind::SystemVariable => &mut self.system_variables,
        }
    }

    pub fn observed(&self, kind: ParameterKind, name: &str) -> Option<&Value> {
        self.values(kind).get(name)
    }
}

/// Snapshots of every reachable component plus the ones that did not answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub snapshots: BTreeMap<Component, RuntimeSnapshot>,
    #[serde(default)]
    pub unreachable: BTreeMap<Component, String>,
}

impl ClusterSnapshot {
    pub fn get(&self, component: Component) -> Option<&RuntimeSnapshot> {
        self.snapshots.get(&component)
    }

    pub fn insert(&mut self, snapshot: RuntimeSnapshot) {
        self.unreachable.remove(&snapshot.component);
        self.snapshots.insert(snapshot.component, snapshot);
    }

    pub fn mark_unreachable(&mut self, component: Component, reason: impl Into<String>) {
        if !self.snapshots.contains_key(&component) {
            self.unreachable.insert(component, reason.into());
        }
    }

    /// Observed value, or `None` when the component or the field is unknown.
    pub fn observed(&self, component: Component, kind: ParameterKind, name: &str) -> Option<&Value> {
        self.get(component).and_then(|s| s.observed(kind, name))
    }
}
