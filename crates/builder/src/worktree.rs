use crate::error::{BuildError, Result};
use crate::git;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct PoolInner {
    repo: PathBuf,
    base_dir: PathBuf,
    name: String,
    next_index: AtomicUsize,
    free: Mutex<Vec<PathBuf>>,
    created: Mutex<Vec<PathBuf>>,
}

impl PoolInner {
    fn release(&self, path: PathBuf) {
        if let Ok(mut free) = self.free.lock() {
            free.push(path);
        }
    }
}

/// Up to `size` separate git worktrees of one repository.
///
/// A worktree holds one checkout at a time, so each is leased exclusively
/// for checkout, extraction and release. Worktrees are created on first use.
#[derive(Clone)]
pub struct WorktreePool {
    inner: Arc<PoolInner>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl std::fmt::Debug for WorktreePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorktreePool")
            .field("repo", &self.inner.repo)
            .field("base_dir", &self.inner.base_dir)
            .field("size", &self.size)
            .finish()
    }
}

impl WorktreePool {
    pub fn new(repo: impl Into<PathBuf>, base_dir: impl Into<PathBuf>, name: impl Into<String>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                repo: repo.into(),
                base_dir: base_dir.into(),
                name: name.into(),
                next_index: AtomicUsize::new(0),
                free: Mutex::new(Vec::new()),
                created: Mutex::new(Vec::new()),
            }),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn repo(&self) -> &Path {
        &self.inner.repo
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a free worktree, creating one when the pool has not reached its size.
    pub async fn lease(&self) -> Result<WorktreeLease> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BuildError::Other("worktree pool closed".into()))?;

        let reused = self.inner.free.lock().ok().and_then(|mut free| free.pop());
        let path = match reused {
            // A timed-out task may have been killed mid-checkout.
            Some(path) => {
                if let Err(err) = git::clear_stale_index_lock(&path).await {
                    self.inner.release(path);
                    return Err(err);
                }
                path
            }
            None => self.create().await?,
        };
        Ok(WorktreeLease {
            path: Some(path),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    async fn create(&self) -> Result<PathBuf> {
        let index = self.inner.next_index.fetch_add(1, Ordering::Relaxed);
        let path = self
            .inner
            .base_dir
            .join(format!("{}-{index}", self.inner.name));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if path.exists() {
            // Left behind by an interrupted run.
            let _ = git::worktree_remove(&self.inner.repo, &path).await;
            let _ = tokio::fs::remove_dir_all(&path).await;
            let _ = git::worktree_prune(&self.inner.repo).await;
        }
        git::worktree_add(&self.inner.repo, &path).await?;
        log::debug!("Created worktree {}", path.display());
        if let Ok(mut created) = self.inner.created.lock() {
            created.push(path.clone());
        }
        Ok(path)
    }

    /// Remove every worktree this pool created.
    pub async fn cleanup(&self) {
        let created: Vec<PathBuf> = self
            .inner
            .created
            .lock()
            .map(|mut c| std::mem::take(&mut *c))
            .unwrap_or_default();
        for path in created {
            if let Err(err) = git::worktree_remove(&self.inner.repo, &path).await {
                log::warn!("Failed to remove worktree {}: {err}", path.display());
            }
        }
        if let Ok(mut free) = self.inner.free.lock() {
            free.clear();
        }
        let _ = git::worktree_prune(&self.inner.repo).await;
    }
}

/// Exclusive use of one worktree; returned to the pool on drop.
pub struct WorktreeLease {
    path: Option<PathBuf>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl WorktreeLease {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for WorktreeLease {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            self.pool.release(path);
        }
    }
}
