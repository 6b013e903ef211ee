use crate::component::{Component, ParameterKind};
use crate::value::Value;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How a snapshot's defaults were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    SourceParse,
    BinaryProbe,
}

/// Defaults of one component at one release tag; the body of `defaults.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub component: Component,
    pub version: Version,
    /// Only meaningful for the primary database component; zero elsewhere.
    #[serde(default)]
    pub bootstrap_version: i64,
    pub generated_at_unix_ms: u64,
    pub method: ExtractionMethod,
    #[serde(default)]
    pub config_defaults: BTreeMap<String, Value>,
    #[serde(default)]
    pub system_variables: BTreeMap<String, Value>,
    /// Parameters whose list values are order sensitive.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub order_sensitive: BTreeSet<String>,
}

impl VersionSnapshot {
    pub fn new(component: Component, version: Version, method: ExtractionMethod) -> Self {
        Self {
            component,
            version,
            bootstrap_version: 0,
            generated_at_unix_ms: 0,
            method,
            config_defaults: BTreeMap::new(),
            system_variables: BTreeMap::new(),
            order_sensitive: BTreeSet::new(),
        }
    }

    pub fn values(&self, kind: ParameterKind) -> &BTreeMap<String, Value> {
        match kind {
            ParameterKind::Config => &self.config_defaults,
            ParameterKind::SystemVariable => &self.system_variables,
        }
    }

    pub fn values_mut(&mut self, kind: ParameterKind) -> &mut BTreeMap<String, Value> {
        match kind {
            ParameterKind::Config => &mut self.config_defaults,
            ParameterKind::SystemVariable => &mut self.system_variables,
        }
    }

    pub fn value(&self, kind: ParameterKind, name: &str) -> Option<&Value> {
        self.values(kind).get(name)
    }

    pub fn is_order_sensitive(&self, name: &str) -> bool {
        self.order_sensitive.contains(name)
    }

    pub fn parameter_count(&self) -> usize {
        self.config_defaults.len() + self.system_variables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::DurationValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut snap = VersionSnapshot::new(
            Component::TiDB,
            Version::parse("v7.1.0").unwrap(),
            ExtractionMethod::SourceParse,
        );
        snap.bootstrap_version = 146;
        snap.generated_at_unix_ms = 1_700_000_000_000;
        snap.config_defaults
            .insert("log.slow-threshold".into(), Value::Int(300));
        snap.config_defaults.insert(
            "tikv-client.grpc-keepalive-time".into(),
            Value::Duration(DurationValue::from_secs(10)),
        );
        snap.system_variables.insert(
            "tidb_isolation_read_engines".into(),
            Value::StringList(vec!["tikv".into(), "tiflash".into(), "tidb".into()]),
        );

        let bytes = serde_json::to_vec_pretty(&snap).unwrap();
        let back: VersionSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, snap);

        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["bootstrap_version"], 146);
        assert_eq!(
            json["config_defaults"]["tikv-client.grpc-keepalive-time"],
            serde_json::json!({"type": "duration", "value": "10s"})
        );
        assert!(json.get("order_sensitive").is_none());
    }
}
