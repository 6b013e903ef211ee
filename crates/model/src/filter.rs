use crate::component::{Component, ParameterKind};
use crate::rename::normalize_spelling;
use crate::value::Value;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Why a parameter is left out of default comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// Set per deployment: compile platform, time zone, cluster endpoints.
    Deployment,
    /// A filesystem location.
    Path,
    /// A listen or advertise address.
    Host,
    /// Auto-tuned from the host's resources; only changed defaults are ignored.
    ResourceDependent,
}

impl FilterReason {
    /// Whether structural changes (removed, renamed, retyped) are ignored too.
    pub fn hides_structural_changes(self) -> bool {
        !matches!(self, FilterReason::ResourceDependent)
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterReason::Deployment => "deployment-specific parameter",
            FilterReason::Path => "path parameter",
            FilterReason::Host => "host/network parameter",
            FilterReason::ResourceDependent => "resource-dependent parameter",
        };
        f.write_str(name)
    }
}

/// How a rule matches a normalized parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "pattern", rename_all = "snake_case")]
pub enum NamePattern {
    /// The whole name.
    Exact(String),
    /// The name, its first dotted segment or its last one.
    Segment(String),
    /// Any substring.
    Contains(String),
}

impl NamePattern {
    fn is_exact(&self) -> bool {
        matches!(self, NamePattern::Exact(_))
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Exact(p) => name == p,
            NamePattern::Segment(p) => {
                name == p
                    || name.strip_suffix(p.as_str()).is_some_and(|rest| rest.ends_with('.'))
                    || name.strip_prefix(p.as_str()).is_some_and(|rest| rest.starts_with('.'))
            }
            NamePattern::Contains(p) => name.contains(p.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(flatten)]
    pub pattern: NamePattern,
    pub reason: FilterReason,
    /// Restricts the rule to one component; every component when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParameterKind>,
    /// First target release the rule applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Version>,
}

impl FilterRule {
    pub fn new(pattern: NamePattern, reason: FilterReason) -> Self {
        Self {
            pattern,
            reason,
            component: None,
            kind: None,
            since: None,
        }
    }

    fn applies(&self, component: Component, kind: ParameterKind, target: &Version) -> bool {
        self.component.map_or(true, |c| c == component)
            && self.kind.map_or(true, |k| k == kind)
            && self.since.as_ref().map_or(true, |since| since <= target)
    }
}

/// Parameters ignored by default comparison, kept as `filters.json` in the knowledge base.
///
/// Exact rules win over everything. A name listed in `exceptions` escapes every
/// other deployment, path or host rule; resource-dependent rules still apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTable {
    #[serde(default)]
    pub rules: Vec<FilterRule>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exceptions: BTreeSet<String>,
}

impl FilterTable {
    pub fn new(rules: Vec<FilterRule>, exceptions: impl IntoIterator<Item = String>) -> Self {
        Self {
            rules,
            exceptions: exceptions.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The reason `name` is filtered when upgrading to `target`, if any.
    pub fn classify(
        &self,
        component: Component,
        kind: ParameterKind,
        name: &str,
        target: &Version,
    ) -> Option<FilterReason> {
        let name = normalize_spelling(kind, name);
        let applicable = || self.rules.iter().filter(|r| r.applies(component, kind, target));
        if let Some(rule) = applicable().find(|r| r.pattern.is_exact() && r.pattern.matches(&name)) {
            return Some(rule.reason);
        }
        let excepted = self.exceptions.contains(&name);
        applicable()
            .filter(|r| !r.pattern.is_exact())
            .filter(|r| !excepted || r.reason == FilterReason::ResourceDependent)
            .find(|r| r.pattern.matches(&name))
            .map(|r| r.reason)
    }

    /// Deployment, path, host and resource-dependent names of a stock TiDB cluster.
    pub fn builtin() -> Self {
        use FilterReason::*;
        use NamePattern::*;

        let mut rules = Vec::new();
        let mut add = |pattern: fn(String) -> NamePattern, reason, names: &[&str]| {
            rules.extend(names.iter().map(|n| FilterRule::new(pattern(n.to_string()), reason)));
        };
        add(Exact, Deployment, &[
            "version_compile_machine",
            "version_compile_os",
            "system_time_zone",
            "time_zone",
            "pd.endpoints",
            "deprecate-integer-display-length",
        ]);
        add(Exact, Path, &[
            "path",
            "socket",
            "temp-dir",
            "tmp-storage-path",
            "log.file.filename",
            "log.slow-query-file",
            "log-file",
            "log-dir",
            "data-dir",
            "deploy-dir",
            "tmp_path",
            "storage.main.dir",
            "storage.latest.dir",
            "storage.raft.dir",
        ]);
        add(Segment, Host, &[
            "host",
            "hostname",
            "addr",
            "address",
            "port",
            "advertise-addr",
            "status-addr",
            "advertise-status-addr",
        ]);
        add(Contains, Path, &[
            "path",
            "-dir",
            "_dir",
            "filename",
            "file-name",
            "file_name",
            "socket",
            "tmp",
            "temp-",
            "deploy",
        ]);
        add(Contains, ResourceDependent, &[
            "auto-tune",
            "auto_tune",
            "num-threads",
            "num_threads",
            "thread-count",
            "thread_count",
            "concurrency",
            "region-max-size",
            "region-max-keys",
            "region-split-size",
            "region-split-keys",
            "sst-max-size",
        ]);

        // Switches that only mention temporary storage.
        let exceptions = [
            "oom-use-tmp-storage",
            "tidb_enable_tmp_storage_on_oom",
            "tidb_tmp_table_max_size",
        ];
        Self::new(rules, exceptions.into_iter().map(String::from))
    }
}

/// A parameter whose override deserves attention before any upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighRiskParameter {
    pub component: Component,
    pub kind: ParameterKind,
    pub name: String,
    /// Shown next to the finding.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    /// Overrides to one of these are accepted silently.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
}

/// Hand-maintained list kept as `high_risk.json` in the knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighRiskTable {
    #[serde(default)]
    pub parameters: Vec<HighRiskParameter>,
}

impl HighRiskTable {
    pub fn new(parameters: Vec<HighRiskParameter>) -> Self {
        Self { parameters }
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Entries matching `component` and `kind`, with names normalized.
    pub fn entries(
        &self,
        component: Component,
        kind: ParameterKind,
    ) -> impl Iterator<Item = (String, &HighRiskParameter)> + '_ {
        self.parameters
            .iter()
            .filter(move |p| p.component == component && p.kind == kind)
            .map(move |p| (normalize_spelling(kind, &p.name), p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn classify(name: &str) -> Option<FilterReason> {
        FilterTable::builtin().classify(Component::TiKV, ParameterKind::Config, name, &v("v7.1.0"))
    }

    #[test]
    fn builtin_table_covers_deployment_names() {
        assert_eq!(classify("data-dir"), Some(FilterReason::Path));
        assert_eq!(classify("log.file.filename"), Some(FilterReason::Path));
        assert_eq!(classify("server.port"), Some(FilterReason::Host));
        assert_eq!(classify("server.advertise-addr"), Some(FilterReason::Host));
        assert_eq!(classify("pd.endpoints"), Some(FilterReason::Deployment));
        assert_eq!(classify("backup.temp-path"), Some(FilterReason::Path));
        assert_eq!(classify("raftstore.raft-engine-dir"), Some(FilterReason::Path));
        assert_eq!(
            FilterTable::builtin().classify(
                Component::TiDB,
                ParameterKind::SystemVariable,
                "@@global.time_zone",
                &v("v7.1.0")
            ),
            Some(FilterReason::Deployment)
        );
    }

    #[test]
    fn resource_dependent_names_are_recognized() {
        assert_eq!(classify("server.grpc-concurrency"), Some(FilterReason::ResourceDependent));
        assert_eq!(classify("backup.num-threads"), Some(FilterReason::ResourceDependent));
        assert_eq!(classify("coprocessor.region-split-size"), Some(FilterReason::ResourceDependent));
    }

    #[test]
    fn ordinary_names_pass() {
        assert_eq!(
            FilterTable::builtin().classify(
                Component::TiDB,
                ParameterKind::SystemVariable,
                "tidb_enable_tmp_storage_on_oom",
                &v("v7.1.0")
            ),
            None
        );
        assert_eq!(classify("raftstore.raft-log-gc-threshold"), None);
        assert_eq!(classify("storage.reserve-space"), None);
        assert_eq!(classify("schedule.leader-schedule-limit"), None);
        assert_eq!(classify("portable-mode"), None);
    }

    #[test]
    fn exceptions_do_not_escape_exact_rules() {
        let table = FilterTable::new(
            vec![
                FilterRule::new(NamePattern::Exact("log.file.max-size".into()), FilterReason::Path),
                FilterRule::new(NamePattern::Contains("log".into()), FilterReason::Path),
            ],
            ["log.file.max-size".to_string(), "log.level".to_string()],
        );
        let target = v("v7.1.0");
        let kind = ParameterKind::Config;
        assert_eq!(
            table.classify(Component::TiDB, kind, "log.file.max-size", &target),
            Some(FilterReason::Path)
        );
        assert_eq!(table.classify(Component::TiDB, kind, "log.level", &target), None);
        assert_eq!(
            table.classify(Component::TiDB, kind, "log.format", &target),
            Some(FilterReason::Path)
        );
    }

    #[test]
    fn rules_respect_component_and_since() {
        let mut rule = FilterRule::new(NamePattern::Exact("a".into()), FilterReason::Deployment);
        rule.component = Some(Component::PD);
        rule.since = Some(v("v7.5.0"));
        let table = FilterTable::new(vec![rule], []);
        let kind = ParameterKind::Config;
        assert_eq!(table.classify(Component::PD, kind, "a", &v("v7.1.0")), None);
        assert_eq!(
            table.classify(Component::PD, kind, "a", &v("v7.5.0")),
            Some(FilterReason::Deployment)
        );
        assert_eq!(table.classify(Component::TiKV, kind, "a", &v("v8.1.0")), None);
    }

    #[test]
    fn table_json_shape() {
        let table = FilterTable::new(
            vec![FilterRule::new(NamePattern::Segment("port".into()), FilterReason::Host)],
            [],
        );
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"rules": [{"match": "segment", "pattern": "port", "reason": "host"}]})
        );
        let back: FilterTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }
}
