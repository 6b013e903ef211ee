use crate::language::SourceLanguage;
use precheck_model::Component;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a component keeps its defaults in source form.
///
/// Each list holds candidates relative to the repository root; missing
/// entries are ignored so one layout covers releases before and after the
/// move of packages under `pkg/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLayout {
    pub component: Component,
    pub language: SourceLanguage,
    /// Files declaring configuration types and their defaults.
    #[serde(default)]
    pub config_files: Vec<PathBuf>,
    /// Directories whose every source file joins `config_files`.
    #[serde(default)]
    pub config_dirs: Vec<PathBuf>,
    /// Root configuration type the dotted names start from.
    pub root_config_types: Vec<String>,
    /// Files declaring system variables.
    #[serde(default)]
    pub sysvar_files: Vec<PathBuf>,
    /// Directories of constants naming system variables.
    #[serde(default)]
    pub constant_dirs: Vec<PathBuf>,
    /// Files holding the bootstrap version and the upgrade steps.
    #[serde(default)]
    pub bootstrap_files: Vec<PathBuf>,
    /// List parameters whose element order changes behavior.
    #[serde(default)]
    pub order_sensitive: Vec<String>,
}

impl SourceLayout {
    pub fn for_component(component: Component) -> Self {
        match component {
            Component::TiDB => Self::tidb(),
            Component::PD => Self::pd(),
            Component::TiKV => Self::tikv(),
            Component::TiFlash => Self::tiflash(),
        }
    }

    fn tidb() -> Self {
        Self {
            component: Component::TiDB,
            language: SourceLanguage::Go,
            config_files: paths(&["pkg/config/config.go", "config/config.go"]),
            config_dirs: Vec::new(),
            root_config_types: vec!["Config".into()],
            sysvar_files: paths(&[
                "pkg/sessionctx/variable/sysvar.go",
                "pkg/sessionctx/variable/noop.go",
                "sessionctx/variable/sysvar.go",
                "sessionctx/variable/noop.go",
            ]),
            constant_dirs: paths(&[
                "pkg/sessionctx/vardef",
                "pkg/sessionctx/variable",
                "sessionctx/variable",
            ]),
            bootstrap_files: paths(&[
                "pkg/session/bootstrap.go",
                "pkg/session/upgrade.go",
                "session/bootstrap.go",
            ]),
            order_sensitive: Vec::new(),
        }
    }

    fn pd() -> Self {
        Self {
            component: Component::PD,
            language: SourceLanguage::Go,
            config_files: paths(&["server/config/config.go"]),
            config_dirs: paths(&["pkg/schedule/config", "pkg/mcs/scheduling/server/config", "server/config"]),
            root_config_types: vec!["Config".into()],
            sysvar_files: Vec::new(),
            constant_dirs: Vec::new(),
            bootstrap_files: Vec::new(),
            // Label levels run from the widest topology domain down.
            order_sensitive: vec!["replication.location-labels".into()],
        }
    }

    fn tikv() -> Self {
        Self {
            component: Component::TiKV,
            language: SourceLanguage::Rust,
            config_files: paths(&["src/config/mod.rs", "src/config.rs"]),
            config_dirs: paths(&[
                "src/server",
                "src/storage",
                "src/coprocessor_v2",
                "components/raftstore/src/store",
                "components/raftstore/src/coprocessor",
                "components/pd_client/src",
                "components/security/src",
                "components/encryption/src",
                "components/backup/src",
                "components/cdc/src",
                "components/resolved_ts/src",
                "components/resource_metering/src",
                "components/causal_ts/src",
            ]),
            root_config_types: vec!["TikvConfig".into(), "TiKvConfig".into()],
            sysvar_files: Vec::new(),
            constant_dirs: Vec::new(),
            bootstrap_files: Vec::new(),
            order_sensitive: Vec::new(),
        }
    }

    fn tiflash() -> Self {
        // TiFlash is C++; only the probe strategy can read its defaults.
        Self {
            component: Component::TiFlash,
            language: SourceLanguage::Rust,
            config_files: Vec::new(),
            config_dirs: Vec::new(),
            root_config_types: Vec::new(),
            sysvar_files: Vec::new(),
            constant_dirs: Vec::new(),
            bootstrap_files: Vec::new(),
            order_sensitive: Vec::new(),
        }
    }

    /// Existing configuration sources under `root`, explicit files first.
    pub fn resolve_config_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut out = existing(root, &self.config_files);
        for dir in &self.config_dirs {
            out.extend(source_files_in(&root.join(dir), self.language));
        }
        dedup_keep_order(out)
    }

    pub fn resolve_sysvar_files(&self, root: &Path) -> Vec<PathBuf> {
        existing(root, &self.sysvar_files)
    }

    pub fn resolve_constant_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for dir in &self.constant_dirs {
            out.extend(source_files_in(&root.join(dir), self.language));
        }
        dedup_keep_order(out)
    }

    pub fn resolve_bootstrap_files(&self, root: &Path) -> Vec<PathBuf> {
        existing(root, &self.bootstrap_files)
    }
}

fn paths(items: &[&str]) -> Vec<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}

fn existing(root: &Path, candidates: &[PathBuf]) -> Vec<PathBuf> {
    candidates
        .iter()
        .map(|rel| root.join(rel))
        .filter(|p| p.is_file())
        .collect()
}

/// Non-test source files directly inside `dir`, sorted for stable output.
fn source_files_in(dir: &Path, language: SourceLanguage) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| SourceLanguage::from_path(path) == Some(language))
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            !name.ends_with("_test.go") && name != "tests.rs"
        })
        .collect();
    files.sort();
    files
}

fn dedup_keep_order(items: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolves_relocated_layouts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("config")).unwrap();
        std::fs::write(root.join("config/config.go"), "package config").unwrap();

        let layout = SourceLayout::for_component(Component::TiDB);
        assert_eq!(
            layout.resolve_config_files(root),
            vec![root.join("config/config.go")]
        );
        assert!(layout.resolve_bootstrap_files(root).is_empty());
    }

    #[test]
    fn directory_sources_skip_tests() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("server/config");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.go"), "package config").unwrap();
        std::fs::write(dir.join("config_test.go"), "package config").unwrap();
        std::fs::write(dir.join("util.go"), "package config").unwrap();

        let files = SourceLayout::for_component(Component::PD).resolve_config_files(tmp.path());
        assert_eq!(files, vec![dir.join("config.go"), dir.join("util.go")]);
    }
}
