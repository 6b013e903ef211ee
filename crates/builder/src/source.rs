use crate::error::{BuildError, Result};
use crate::git;
use crate::worktree::{WorktreeLease, WorktreePool};
use async_trait::async_trait;
use precheck_model::Component;
use std::path::{Path, PathBuf};

/// A checked-out revision, held exclusively until dropped.
pub struct Checkout {
    root: PathBuf,
    commit: Option<String>,
    _lease: Option<WorktreeLease>,
}

impl Checkout {
    pub fn new(root: impl Into<PathBuf>, commit: Option<String>) -> Self {
        Self {
            root: root.into(),
            commit,
            _lease: None,
        }
    }

    fn leased(lease: WorktreeLease, commit: String) -> Self {
        Self {
            root: lease.path().to_path_buf(),
            commit: Some(commit),
            _lease: Some(lease),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commit(&self) -> Option<&str> {
        self.commit.as_deref()
    }
}

/// Where one component's sources come from.
#[async_trait]
pub trait SourceTree: Send + Sync {
    fn component(&self) -> Component;

    /// Whether the source is usable at all.
    async fn is_available(&self) -> bool;

    async fn list_tags(&self) -> Result<Vec<String>>;

    /// Materialize `rev` in a directory nobody else is using.
    async fn checkout(&self, rev: &str) -> Result<Checkout>;

    /// Release any on-disk resources created for checkouts.
    async fn cleanup(&self) {}
}

/// A git repository checked out through a pool of worktrees.
#[derive(Debug, Clone)]
pub struct GitSourceTree {
    component: Component,
    pool: WorktreePool,
}

impl GitSourceTree {
    pub fn new(component: Component, repo: impl Into<PathBuf>, worktree_dir: &Path, size: usize) -> Self {
        Self {
            component,
            pool: WorktreePool::new(repo, worktree_dir, component.as_str(), size),
        }
    }
}

#[async_trait]
impl SourceTree for GitSourceTree {
    fn component(&self) -> Component {
        self.component
    }

    async fn is_available(&self) -> bool {
        git::is_git_repository(self.pool.repo()).await
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        git::list_tags(self.pool.repo()).await
    }

    async fn checkout(&self, rev: &str) -> Result<Checkout> {
        let lease = self.pool.lease().await?;
        let commit = git::checkout(lease.path(), rev).await?;
        Ok(Checkout::leased(lease, commit))
    }

    async fn cleanup(&self) {
        self.pool.cleanup().await;
    }
}

/// Pre-extracted source trees laid out as `<root>/<rev>/`, one directory per tag.
///
/// Useful for release tarballs and for running the pipeline without git.
#[derive(Debug, Clone)]
pub struct DirectorySourceTree {
    component: Component,
    root: PathBuf,
}

impl DirectorySourceTree {
    pub fn new(component: Component, root: impl Into<PathBuf>) -> Self {
        Self {
            component,
            root: root.into(),
        }
    }
}

#[async_trait]
impl SourceTree for DirectorySourceTree {
    fn component(&self) -> Component {
        self.component
    }

    async fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    tags.push(name.to_string());
                }
            }
        }
        tags.sort();
        Ok(tags)
    }

    async fn checkout(&self, rev: &str) -> Result<Checkout> {
        let dir = self.root.join(rev);
        if !dir.is_dir() {
            return Err(BuildError::Other(format!(
                "{} has no directory for {rev}",
                self.root.display()
            )));
        }
        Ok(Checkout::new(dir, None))
    }
}
