use crate::component::{Component, ParameterKind};
use crate::version::Version;
use serde::{Deserialize, Serialize};

/// Bounds alias chains so a cyclic table cannot loop forever.
const MAX_ALIAS_HOPS: usize = 16;

const SCOPE_PREFIXES: [&str; 4] = ["@@global.", "@@session.", "@@", "global."];

/// One entry of the rename table.
///
/// An alias rule (`alias = true`) is a spelling variant that always resolves to
/// `to`. A rename rule records that `from` became `to` in release `since`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    pub component: Component,
    pub kind: ParameterKind,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Version>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub alias: bool,
}

/// Versioned canonicalization data, kept as `renames.json` in the knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameTable {
    #[serde(default)]
    pub rules: Vec<RenameRule>,
}

impl RenameTable {
    pub fn new(rules: Vec<RenameRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve a spelling to the parameter's canonical identity.
    pub fn canonicalize(&self, component: Component, kind: ParameterKind, name: &str) -> String {
        let mut current = normalize_spelling(kind, name);
        for _ in 0..MAX_ALIAS_HOPS {
            let next = self
                .rules
                .iter()
                .filter(|r| r.alias && r.component == component && r.kind == kind)
                .find(|r| normalize_spelling(kind, &r.from) == current)
                .map(|r| normalize_spelling(kind, &r.to));
            match next {
                Some(to) if to != current => current = to,
                _ => break,
            }
        }
        current
    }

    /// The name `name` carries after upgrading from `from` to `to`, if a rename
    /// rule took effect on that path. Chains of renames are followed.
    pub fn renamed_in(
        &self,
        component: Component,
        kind: ParameterKind,
        name: &str,
        from: &Version,
        to: &Version,
    ) -> Option<String> {
        let mut current = self.canonicalize(component, kind, name);
        let mut renamed = false;
        for _ in 0..MAX_ALIAS_HOPS {
            let next = self
                .rules
                .iter()
                .filter(|r| !r.alias && r.component == component && r.kind == kind)
                .filter(|r| match &r.since {
                    Some(since) => since > from && since <= to,
                    None => true,
                })
                .find(|r| self.canonicalize(component, kind, &r.from) == current)
                .map(|r| self.canonicalize(component, kind, &r.to));
            match next {
                Some(to_name) if to_name != current => {
                    current = to_name;
                    renamed = true;
                }
                _ => break,
            }
        }
        renamed.then_some(current)
    }
}

/// Case and scope-prefix normalization shared by every component.
pub fn normalize_spelling(kind: ParameterKind, name: &str) -> String {
    let mut normalized = name.trim().to_ascii_lowercase();
    if kind == ParameterKind::SystemVariable {
        for prefix in SCOPE_PREFIXES {
            if let Some(rest) = normalized.strip_prefix(prefix) {
                normalized = rest.to_string();
                break;
            }
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(from: &str, to: &str, since: Option<&str>, alias: bool) -> RenameRule {
        RenameRule {
            component: Component::TiDB,
            kind: ParameterKind::SystemVariable,
            from: from.into(),
            to: to.into(),
            since: since.map(|s| Version::parse(s).unwrap()),
            alias,
        }
    }

    #[test]
    fn canonicalize_strips_scope_and_case() {
        let table = RenameTable::default();
        assert_eq!(
            table.canonicalize(Component::TiDB, ParameterKind::SystemVariable, " @@GLOBAL.TiDB_Mem_Quota_Query "),
            "tidb_mem_quota_query"
        );
        assert_eq!(
            table.canonicalize(Component::TiDB, ParameterKind::SystemVariable, "global.tidb_enable_async_commit"),
            "tidb_enable_async_commit"
        );
    }

    #[test]
    fn aliases_resolve_and_cycles_terminate() {
        let table = RenameTable::new(vec![
            rule("a", "b", None, true),
            rule("b", "a", None, true),
            rule("x", "y", None, true),
        ]);
        assert_eq!(
            table.canonicalize(Component::TiDB, ParameterKind::SystemVariable, "x"),
            "y"
        );
        let looped = table.canonicalize(Component::TiDB, ParameterKind::SystemVariable, "a");
        assert!(looped == "a" || looped == "b");
    }

    #[test]
    fn rename_applies_only_inside_path() {
        let table = RenameTable::new(vec![rule(
            "tidb_enable_old",
            "tidb_enable_new",
            Some("v7.0.0"),
            false,
        )]);
        let v65 = Version::parse("v6.5.0").unwrap();
        let v71 = Version::parse("v7.1.0").unwrap();
        let v75 = Version::parse("v7.5.0").unwrap();
        assert_eq!(
            table.renamed_in(Component::TiDB, ParameterKind::SystemVariable, "tidb_enable_old", &v65, &v71),
            Some("tidb_enable_new".to_string())
        );
        assert_eq!(
            table.renamed_in(Component::TiDB, ParameterKind::SystemVariable, "tidb_enable_old", &v71, &v75),
            None
        );
        assert_eq!(
            table.renamed_in(Component::PD, ParameterKind::SystemVariable, "tidb_enable_old", &v65, &v71),
            None
        );
    }
}
