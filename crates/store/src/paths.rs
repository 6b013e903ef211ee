use precheck_model::{Component, Version};
use std::path::{Path, PathBuf};

pub const DEFAULTS_FILE_NAME: &str = "defaults.json";
pub const UPGRADE_LOGIC_FILE_NAME: &str = "upgrade_logic.json";
pub const LEDGER_FILE_NAME: &str = "generated_versions.json";
pub const RENAMES_FILE_NAME: &str = "renames.json";
pub const FILTERS_FILE_NAME: &str = "filters.json";
pub const HIGH_RISK_FILE_NAME: &str = "high_risk.json";
pub const HISTORY_FILE_NAME: &str = "parameters_history.json";
pub const LOCK_FILE_NAME: &str = ".kb.lock";

/// Environment override for the knowledge base directory.
pub const KB_DIR_ENV: &str = "UPGRADE_PRECHECK_KB_DIR";
pub const DEFAULT_KB_DIR_NAME: &str = "knowledge";

#[must_use]
pub fn version_dir(root: &Path, version: &Version) -> PathBuf {
    root.join(version.release_line()).join(version.to_string())
}

#[must_use]
pub fn defaults_path(root: &Path, version: &Version, component: Component) -> PathBuf {
    version_dir(root, version)
        .join(component.as_str())
        .join(DEFAULTS_FILE_NAME)
}

#[must_use]
pub fn upgrade_logic_path(root: &Path) -> PathBuf {
    root.join(UPGRADE_LOGIC_FILE_NAME)
}

#[must_use]
pub fn ledger_path(root: &Path) -> PathBuf {
    root.join(LEDGER_FILE_NAME)
}

#[must_use]
pub fn renames_path(root: &Path) -> PathBuf {
    root.join(RENAMES_FILE_NAME)
}

#[must_use]
pub fn filters_path(root: &Path) -> PathBuf {
    root.join(FILTERS_FILE_NAME)
}

#[must_use]
pub fn high_risk_path(root: &Path) -> PathBuf {
    root.join(HIGH_RISK_FILE_NAME)
}

#[must_use]
pub fn history_path(root: &Path) -> PathBuf {
    root.join(HISTORY_FILE_NAME)
}

#[must_use]
pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE_NAME)
}

/// Knowledge base directory: explicit value, then the environment, then `./knowledge`.
#[must_use]
pub fn resolve_kb_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var(KB_DIR_ENV)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_KB_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_release_line() {
        let root = Path::new("/kb");
        let version = Version::parse("v7.1.3").unwrap();
        assert_eq!(
            defaults_path(root, &version, Component::TiKV),
            PathBuf::from("/kb/v7.1/v7.1.3/tikv/defaults.json")
        );
    }

    #[test]
    fn explicit_kb_dir_wins() {
        assert_eq!(
            resolve_kb_dir(Some(Path::new("/tmp/kb"))),
            PathBuf::from("/tmp/kb")
        );
    }
}
