use precheck_model::{ForcedMutation, ParameterKey, RenameTable, UpgradeLogicSet};
use serde::Serialize;
use std::collections::BTreeMap;

/// Forced mutations applied between two bootstrap versions, in replay order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForcedPath {
    pub from_bootstrap: i64,
    pub to_bootstrap: i64,
    pub mutations: Vec<ForcedMutation>,
}

impl ForcedPath {
    /// Mutations with bootstrap version in `(from, to]`.
    pub fn between(logic: &UpgradeLogicSet, from: i64, to: i64) -> Self {
        let mut mutations: Vec<ForcedMutation> = logic.in_range(from, to).cloned().collect();
        mutations.sort_by_key(|m| m.introduced_at_bootstrap_version);
        Self {
            from_bootstrap: from,
            to_bootstrap: to,
            mutations,
        }
    }

    pub fn empty(at: i64) -> Self {
        Self {
            from_bootstrap: at,
            to_bootstrap: at,
            mutations: Vec::new(),
        }
    }

    /// `self` followed by `next`.
    pub fn compose(mut self, next: ForcedPath) -> Self {
        self.to_bootstrap = next.to_bootstrap;
        self.mutations.extend(next.mutations);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// The last mutation per canonical parameter; it decides the expected value.
    pub fn final_values(&self, renames: &RenameTable) -> BTreeMap<ParameterKey, &ForcedMutation> {
        let mut out = BTreeMap::new();
        for mutation in &self.mutations {
            out.insert(canonical_key(renames, mutation), mutation);
        }
        out
    }

    /// Every mutation whose canonical identity is `key`, oldest first.
    pub fn steps_for(&self, key: &ParameterKey, renames: &RenameTable) -> Vec<&ForcedMutation> {
        self.mutations
            .iter()
            .filter(|m| canonical_key(renames, m) == *key)
            .collect()
    }
}

fn canonical_key(renames: &RenameTable, mutation: &ForcedMutation) -> ParameterKey {
    ParameterKey::new(
        mutation.component,
        mutation.kind,
        renames.canonicalize(mutation.component, mutation.kind, &mutation.parameter_name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use precheck_model::{Component, ParameterKind, RenameRule, Value};
    use proptest::prelude::*;

    fn mutation(name: &str, to: i64, at: i64) -> ForcedMutation {
        ForcedMutation {
            component: Component::TiDB,
            kind: ParameterKind::SystemVariable,
            parameter_name: name.to_string(),
            from_value: None,
            to_value: Value::Int(to),
            introduced_at_bootstrap_version: at,
            description: String::new(),
            source_function: format!("upgradeToVer{at}"),
        }
    }

    #[test]
    fn later_mutation_wins_but_trace_keeps_both() {
        let logic = UpgradeLogicSet::new(vec![
            mutation("tidb_analyze_version", 2, 97),
            mutation("tidb_analyze_version", 1, 92),
            mutation("tidb_other", 1, 120),
        ]);
        let path = ForcedPath::between(&logic, 90, 100);
        let renames = RenameTable::default();
        let finals = path.final_values(&renames);
        assert_eq!(finals.len(), 1);
        let key = ParameterKey::new(Component::TiDB, ParameterKind::SystemVariable, "tidb_analyze_version");
        assert_eq!(finals[&key].to_value, Value::Int(2));
        assert_eq!(path.steps_for(&key, &renames).len(), 2);
    }

    #[test]
    fn spellings_of_one_parameter_merge_before_the_last_wins() {
        let logic = UpgradeLogicSet::new(vec![mutation("tidb_x", 1, 92), mutation("TiDB_Y", 2, 97)]);
        let renames = RenameTable::new(vec![RenameRule {
            component: Component::TiDB,
            kind: ParameterKind::SystemVariable,
            from: "tidb_x".into(),
            to: "tidb_y".into(),
            since: None,
            alias: true,
        }]);
        let path = ForcedPath::between(&logic, 90, 100);
        let finals = path.final_values(&renames);
        let key = ParameterKey::new(Component::TiDB, ParameterKind::SystemVariable, "tidb_y");
        assert_eq!(finals.keys().collect::<Vec<_>>(), vec![&key]);
        assert_eq!(finals[&key].to_value, Value::Int(2));
        assert_eq!(path.steps_for(&key, &renames).len(), 2);
    }

    #[test]
    fn range_is_half_open() {
        let logic = UpgradeLogicSet::new(vec![mutation("a", 1, 90), mutation("b", 1, 100)]);
        let path = ForcedPath::between(&logic, 90, 100);
        assert_eq!(path.mutations.len(), 1);
        assert_eq!(path.mutations[0].parameter_name, "b");
    }

    fn arb_logic() -> impl Strategy<Value = UpgradeLogicSet> {
        prop::collection::vec((0usize..4, 0i64..5, 0i64..60), 0..40).prop_map(|raw| {
            let names = ["a", "b", "c", "d"];
            UpgradeLogicSet::new(
                raw.into_iter()
                    .map(|(n, to, at)| mutation(names[n], to, at))
                    .collect(),
            )
        })
    }

    proptest! {
        #[test]
        fn composition_matches_direct_path(
            logic in arb_logic(),
            mut bounds in prop::collection::vec(0i64..60, 3),
        ) {
            bounds.sort();
            let (b1, b2, b3) = (bounds[0], bounds[1], bounds[2]);
            let direct = ForcedPath::between(&logic, b1, b3);
            let composed = ForcedPath::between(&logic, b1, b2).compose(ForcedPath::between(&logic, b2, b3));
            prop_assert_eq!(&direct, &composed);
            let renames = RenameTable::default();
            prop_assert_eq!(direct.final_values(&renames), composed.final_values(&renames));
        }

        #[test]
        fn composition_is_associative(
            logic in arb_logic(),
            mut bounds in prop::collection::vec(0i64..60, 4),
        ) {
            bounds.sort();
            let p = |a: usize, b: usize| ForcedPath::between(&logic, bounds[a], bounds[b]);
            let left = p(0, 1).compose(p(1, 2)).compose(p(2, 3));
            let right = p(0, 1).compose(p(1, 2).compose(p(2, 3)));
            prop_assert_eq!(left, right);
        }
    }
}
