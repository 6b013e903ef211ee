use crate::error::{Result, StoreError};
use crate::io::{read_json_optional, write_json_atomic};
use crate::ledger::{GenerationLedger, LEDGER_SCHEMA_VERSION};
use crate::lock::{acquire_store_write_lock, StoreWriteLock};
use crate::paths;
use precheck_model::{
    current_unix_ms, Component, FilterTable, ForcedMutation, HighRiskTable, RenameTable,
    UpgradeLogicSet, Version, VersionSnapshot,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Whether `put` may replace an existing snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Force,
}

/// Result of a successful `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub path: PathBuf,
    pub digest: String,
    pub replaced: bool,
}

/// Result of appending forced mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub added: usize,
    pub total: usize,
}

/// Handle to a knowledge base directory.
///
/// Every write goes through write-temp-then-rename, so concurrent readers see
/// either the old artifact or the new one.
#[derive(Debug, Clone)]
pub struct VersionStore {
    root: PathBuf,
}

impl VersionStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// A handle that does not create the directory; reads on a missing root see an empty store.
    #[must_use]
    pub fn at(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn snapshot_path(&self, version: &Version, component: Component) -> PathBuf {
        paths::defaults_path(&self.root, version, component)
    }

    /// Exclusive writer lock shared with other processes using the same root.
    pub async fn lock(&self) -> Result<StoreWriteLock> {
        acquire_store_write_lock(&self.root).await
    }

    pub async fn exists(&self, version: &Version, component: Component) -> bool {
        tokio::fs::metadata(self.snapshot_path(version, component))
            .await
            .is_ok()
    }

    pub async fn put(&self, snapshot: &VersionSnapshot, mode: WriteMode) -> Result<PutOutcome> {
        let path = self.snapshot_path(&snapshot.version, snapshot.component);
        let replaced = self.exists(&snapshot.version, snapshot.component).await;
        if replaced && mode == WriteMode::Create {
            return Err(StoreError::Conflict {
                version: snapshot.version.clone(),
                component: snapshot.component,
            });
        }
        let digest = write_json_atomic(&path, snapshot).await?;
        log::debug!(
            "Stored {} {} ({} parameters) at {}",
            snapshot.component,
            snapshot.version,
            snapshot.parameter_count(),
            path.display()
        );
        Ok(PutOutcome {
            path,
            digest,
            replaced,
        })
    }

    pub async fn get(&self, version: &Version, component: Component) -> Result<VersionSnapshot> {
        let path = self.snapshot_path(version, component);
        read_json_optional(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                version: version.clone(),
                component,
            })
    }

    /// Remove a snapshot; returns whether one existed.
    pub async fn delete(&self, version: &Version, component: Component) -> Result<bool> {
        let path = self.snapshot_path(version, component);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                if let Some(dir) = path.parent() {
                    // Only succeeds when the component directory is now empty.
                    let _ = tokio::fs::remove_dir(dir).await;
                }
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Every stored version of `component`, in semantic order.
    pub async fn list_versions(&self, component: Component) -> Result<Vec<Version>> {
        let mut versions = Vec::new();
        let mut lines = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(err) => return Err(err.into()),
        };
        while let Some(line) = lines.next_entry().await? {
            if !line.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(line.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let Ok(version) = Version::parse(&name) else {
                    continue;
                };
                let defaults = entry
                    .path()
                    .join(component.as_str())
                    .join(paths::DEFAULTS_FILE_NAME);
                if tokio::fs::metadata(&defaults).await.is_ok() {
                    versions.push(version);
                }
            }
        }
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    pub async fn get_upgrade_logic(&self) -> Result<UpgradeLogicSet> {
        Ok(read_json_optional(&paths::upgrade_logic_path(&self.root))
            .await?
            .unwrap_or_default())
    }

    /// Append mutations not yet recorded; existing records stay as they are.
    pub async fn put_upgrade_logic(
        &self,
        mutations: impl IntoIterator<Item = ForcedMutation>,
    ) -> Result<AppendOutcome> {
        let mut set = self.get_upgrade_logic().await?;
        let added = set.append(mutations);
        if added > 0 || !paths::upgrade_logic_path(&self.root).exists() {
            write_json_atomic(&paths::upgrade_logic_path(&self.root), &set).await?;
        }
        Ok(AppendOutcome {
            added,
            total: set.len(),
        })
    }

    pub async fn load_ledger(&self) -> Result<GenerationLedger> {
        let ledger: GenerationLedger = read_json_optional(&paths::ledger_path(&self.root))
            .await?
            .unwrap_or_default();
        if ledger.schema_version != LEDGER_SCHEMA_VERSION {
            return Err(StoreError::Schema {
                artifact: paths::LEDGER_FILE_NAME,
                found: ledger.schema_version,
                expected: LEDGER_SCHEMA_VERSION,
            });
        }
        Ok(ledger)
    }

    pub async fn save_ledger(&self, ledger: &GenerationLedger) -> Result<()> {
        write_json_atomic(&paths::ledger_path(&self.root), ledger).await?;
        Ok(())
    }

    /// Load, record and save in one step.
    pub async fn mark_generated(
        &self,
        version: &Version,
        component: Component,
        commit: Option<String>,
        digest: Option<String>,
    ) -> Result<()> {
        let mut ledger = self.load_ledger().await?;
        let now = current_unix_ms();
        ledger.mark_generated(version, component, commit, digest, now);
        ledger.last_run_at_unix_ms = now;
        self.save_ledger(&ledger).await
    }

    pub async fn is_generated(&self, version: &Version) -> Result<bool> {
        Ok(self.load_ledger().await?.is_generated(version))
    }

    /// The rename table, empty when `renames.json` is absent.
    pub async fn rename_table(&self) -> Result<RenameTable> {
        Ok(read_json_optional(&paths::renames_path(&self.root))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_rename_table(&self, table: &RenameTable) -> Result<()> {
        write_json_atomic(&paths::renames_path(&self.root), table).await?;
        Ok(())
    }

    /// The filter table; the built-in one when `filters.json` is absent.
    pub async fn filter_table(&self) -> Result<FilterTable> {
        Ok(read_json_optional(&paths::filters_path(&self.root))
            .await?
            .unwrap_or_else(FilterTable::builtin))
    }

    pub async fn save_filter_table(&self, table: &FilterTable) -> Result<()> {
        write_json_atomic(&paths::filters_path(&self.root), table).await?;
        Ok(())
    }

    pub async fn high_risk_table(&self) -> Result<HighRiskTable> {
        Ok(read_json_optional(&paths::high_risk_path(&self.root))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_high_risk_table(&self, table: &HighRiskTable) -> Result<()> {
        write_json_atomic(&paths::high_risk_path(&self.root), table).await?;
        Ok(())
    }

    /// Persist the aggregated parameter history.
    pub async fn write_history<T: Serialize>(&self, history: &T) -> Result<PathBuf> {
        let path = paths::history_path(&self.root);
        write_json_atomic(&path, history).await?;
        Ok(path)
    }
}
