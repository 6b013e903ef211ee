use precheck_model::{Component, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const LEDGER_SCHEMA_VERSION: u32 = 1;

/// What the ledger knows about one generated version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: Version,
    #[serde(default)]
    pub components: BTreeSet<Component>,
    pub generated_at_unix_ms: u64,
    /// Source commit the tag pointed at, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// sha256 of each written `defaults.json`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digests: BTreeMap<Component, String>,
}

/// Record of processed versions, persisted as `generated_versions.json`.
///
/// Entries are only added during normal runs; `forget` is reserved for force mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationLedger {
    pub schema_version: u32,
    #[serde(default)]
    pub versions: BTreeMap<String, LedgerEntry>,
    #[serde(default)]
    pub last_run_at_unix_ms: u64,
}

impl Default for GenerationLedger {
    fn default() -> Self {
        Self {
            schema_version: LEDGER_SCHEMA_VERSION,
            versions: BTreeMap::new(),
            last_run_at_unix_ms: 0,
        }
    }
}

impl GenerationLedger {
    pub fn is_generated(&self, version: &Version) -> bool {
        self.versions.contains_key(&version.to_string())
    }

    pub fn is_generated_for(&self, version: &Version, component: Component) -> bool {
        self.versions
            .get(&version.to_string())
            .is_some_and(|entry| entry.components.contains(&component))
    }

    pub fn entry(&self, version: &Version) -> Option<&LedgerEntry> {
        self.versions.get(&version.to_string())
    }

    /// Record one generated (version, component) pair.
    pub fn mark_generated(
        &mut self,
        version: &Version,
        component: Component,
        commit: Option<String>,
        digest: Option<String>,
        at_unix_ms: u64,
    ) {
        let entry = self
            .versions
            .entry(version.to_string())
            .or_insert_with(|| LedgerEntry {
                version: version.clone(),
                components: BTreeSet::new(),
                generated_at_unix_ms: at_unix_ms,
                commit: None,
                digests: BTreeMap::new(),
            });
        entry.components.insert(component);
        entry.generated_at_unix_ms = entry.generated_at_unix_ms.max(at_unix_ms);
        if commit.is_some() {
            entry.commit = commit;
        }
        if let Some(digest) = digest {
            entry.digests.insert(component, digest);
        }
    }

    /// Drop a component from a version entry; the entry goes when it is empty.
    pub fn forget(&mut self, version: &Version, component: Component) -> bool {
        let key = version.to_string();
        let Some(entry) = self.versions.get_mut(&key) else {
            return false;
        };
        let removed = entry.components.remove(&component);
        entry.digests.remove(&component);
        if entry.components.is_empty() {
            self.versions.remove(&key);
        }
        removed
    }

    /// Versions in semantic order.
    pub fn generated_versions(&self) -> Vec<Version> {
        let mut out: Vec<Version> = self.versions.values().map(|e| e.version.clone()).collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_forget_per_component() {
        let mut ledger = GenerationLedger::default();
        let v = Version::parse("v7.1.0").unwrap();
        ledger.mark_generated(&v, Component::TiDB, Some("abc".into()), Some("d1".into()), 10);
        ledger.mark_generated(&v, Component::PD, None, None, 20);

        assert!(ledger.is_generated(&v));
        assert!(ledger.is_generated_for(&v, Component::PD));
        assert!(!ledger.is_generated_for(&v, Component::TiKV));
        let entry = ledger.entry(&v).unwrap();
        assert_eq!(entry.commit.as_deref(), Some("abc"));
        assert_eq!(entry.generated_at_unix_ms, 20);

        assert!(ledger.forget(&v, Component::TiDB));
        assert!(ledger.is_generated(&v));
        assert!(ledger.forget(&v, Component::PD));
        assert!(!ledger.is_generated(&v));
    }

    #[test]
    fn generated_versions_sort_semantically() {
        let mut ledger = GenerationLedger::default();
        for tag in ["v7.1.10", "v7.1.2", "v6.5.0"] {
            ledger.mark_generated(&Version::parse(tag).unwrap(), Component::TiDB, None, None, 1);
        }
        let tags: Vec<String> = ledger.generated_versions().iter().map(Version::to_string).collect();
        assert_eq!(tags, vec!["v6.5.0", "v7.1.2", "v7.1.10"]);
    }
}
