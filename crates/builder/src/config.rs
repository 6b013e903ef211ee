use crate::error::{BuildError, Result};
use precheck_model::{Component, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "precheck.toml";

const DEFAULT_TASK_TIMEOUT_SECS: u64 = 900;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_UPGRADE_LOGIC_REF: &str = "master";

/// How one component's defaults are obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    #[default]
    Static,
    Probe,
}

impl FromStr for ExtractionStrategy {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" | "source" => Ok(ExtractionStrategy::Static),
            "probe" | "binary" => Ok(ExtractionStrategy::Probe),
            other => Err(BuildError::Config(format!("unknown extraction strategy `{other}`"))),
        }
    }
}

/// How a repository path is read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryLayout {
    /// A git clone; tags are checked out into pooled worktrees.
    #[default]
    Git,
    /// One unpacked source directory per tag.
    Directories,
}

/// One component's source repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub layout: RepositoryLayout,
    #[serde(default)]
    pub strategy: ExtractionStrategy,
    /// Shell command for the probe strategy; `{root}` and `{version}` are substituted.
    #[serde(default)]
    pub probe_command: Option<String>,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

fn default_upgrade_logic_ref() -> String {
    DEFAULT_UPGRADE_LOGIC_REF.to_string()
}

/// Contents of `precheck.toml`; command-line flags override these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    #[serde(default)]
    pub kb_dir: Option<PathBuf>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Release lines scanned by auto discovery, e.g. `v7.1`.
    #[serde(default)]
    pub release_lines: Vec<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
    /// Revision whose bootstrap sources hold the full upgrade history.
    #[serde(default = "default_upgrade_logic_ref")]
    pub upgrade_logic_ref: String,
    /// Directory holding the worktree pool; defaults to `<kb_dir>/.worktrees`.
    #[serde(default)]
    pub worktree_dir: Option<PathBuf>,
    #[serde(default)]
    pub repositories: BTreeMap<Component, RepositoryConfig>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            kb_dir: None,
            concurrency: None,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            release_lines: Vec::new(),
            start: None,
            stop: None,
            upgrade_logic_ref: default_upgrade_logic_ref(),
            worktree_dir: None,
            repositories: BTreeMap::new(),
        }
    }
}

impl BuilderConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: BuilderConfig =
            toml::from_str(raw).map_err(|e| BuildError::Config(format!("{CONFIG_FILE_NAME}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        // Relative repository paths are relative to the file, not the shell.
        if let Some(base) = path.parent() {
            for repo in config.repositories.values_mut() {
                if repo.path.is_relative() {
                    repo.path = base.join(&repo.path);
                }
            }
        }
        Ok(config)
    }

    /// `./precheck.toml` when present, otherwise defaults.
    pub fn load_default() -> Result<Self> {
        let path = Path::new(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        for (component, repo) in &self.repositories {
            if repo.strategy == ExtractionStrategy::Probe && repo.probe_command.is_none() {
                return Err(BuildError::Config(format!(
                    "repositories.{component}: probe strategy needs probe_command"
                )));
            }
        }
        for bound in [&self.start, &self.stop].into_iter().flatten() {
            Version::parse(bound)
                .map_err(|e| BuildError::Config(format!("invalid bound `{bound}`: {e}")))?;
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs.max(1))
    }

    pub fn start_bound(&self) -> Option<Version> {
        self.start.as_deref().and_then(|s| Version::parse(s).ok())
    }

    pub fn stop_bound(&self) -> Option<Version> {
        self.stop.as_deref().and_then(|s| Version::parse(s).ok())
    }
}
