use crate::component::{Component, ParameterKey, ParameterKind};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A parameter change applied unconditionally by one bootstrap step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcedMutation {
    pub component: Component,
    pub kind: ParameterKind,
    pub parameter_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_value: Option<Value>,
    pub to_value: Value,
    pub introduced_at_bootstrap_version: i64,
    #[serde(default)]
    pub description: String,
    /// Bootstrap function the statement was found in, e.g. `upgradeToVer97`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_function: String,
}

impl ForcedMutation {
    pub fn key(&self) -> ParameterKey {
        ParameterKey::new(self.component, self.kind, self.parameter_name.clone())
    }

    /// Two records with the same identity describe the same statement.
    pub fn same_identity(&self, other: &ForcedMutation) -> bool {
        self.component == other.component
            && self.kind == other.kind
            && self.parameter_name == other.parameter_name
            && self.introduced_at_bootstrap_version == other.introduced_at_bootstrap_version
            && self.to_value == other.to_value
    }
}

/// Every forced mutation known to the knowledge base, ordered by bootstrap version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpgradeLogicSet {
    #[serde(default)]
    pub mutations: Vec<ForcedMutation>,
}

impl UpgradeLogicSet {
    pub fn new(mut mutations: Vec<ForcedMutation>) -> Self {
        // Stable: statements within one bootstrap step keep their source order.
        mutations.sort_by_key(|m| m.introduced_at_bootstrap_version);
        Self { mutations }
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn contains(&self, mutation: &ForcedMutation) -> bool {
        self.mutations.iter().any(|m| m.same_identity(mutation))
    }

    /// Append records not already present; existing records are never touched.
    /// Returns how many were added.
    pub fn append(&mut self, incoming: impl IntoIterator<Item = ForcedMutation>) -> usize {
        let mut added = 0;
        for mutation in incoming {
            if !self.contains(&mutation) {
                self.mutations.push(mutation);
                added += 1;
            }
        }
        if added > 0 {
            self.mutations
                .sort_by_key(|m| m.introduced_at_bootstrap_version);
        }
        added
    }

    /// Mutations with bootstrap version in `(from, to]`, in replay order.
    pub fn in_range(&self, from: i64, to: i64) -> impl Iterator<Item = &ForcedMutation> {
        self.mutations.iter().filter(move |m| {
            m.introduced_at_bootstrap_version > from && m.introduced_at_bootstrap_version <= to
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutation(name: &str, to: bool, at: i64) -> ForcedMutation {
        ForcedMutation {
            component: Component::TiDB,
            kind: ParameterKind::SystemVariable,
            parameter_name: name.into(),
            from_value: None,
            to_value: Value::Bool(to),
            introduced_at_bootstrap_version: at,
            description: String::new(),
            source_function: format!("upgradeToVer{at}"),
        }
    }

    #[test]
    fn append_skips_known_records_and_keeps_order() {
        let mut set = UpgradeLogicSet::new(vec![mutation("a", true, 90), mutation("b", true, 80)]);
        assert_eq!(set.mutations[0].parameter_name, "b");

        let added = set.append(vec![mutation("a", true, 90), mutation("a", false, 95)]);
        assert_eq!(added, 1);
        assert_eq!(set.len(), 3);
        assert_eq!(set.mutations[2].introduced_at_bootstrap_version, 95);
    }

    #[test]
    fn range_is_half_open() {
        let set = UpgradeLogicSet::new(vec![
            mutation("a", true, 90),
            mutation("b", true, 95),
            mutation("c", true, 100),
        ]);
        let names: Vec<_> = set.in_range(90, 100).map(|m| m.parameter_name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}
