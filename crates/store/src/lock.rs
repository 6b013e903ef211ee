use crate::error::{Result, StoreError};
use crate::paths::lock_path;
use fs2::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static STORE_LOCK_WAIT_MS_LAST: AtomicU64 = AtomicU64::new(0);

pub fn store_lock_wait_ms_last() -> u64 {
    STORE_LOCK_WAIT_MS_LAST.load(Ordering::Relaxed)
}

/// Cross-process exclusive lock on a knowledge base; released on drop.
pub struct StoreWriteLock {
    file: std::fs::File,
}

impl Drop for StoreWriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub(crate) async fn acquire_store_write_lock(root: &Path) -> Result<StoreWriteLock> {
    let path = lock_path(root);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::task::spawn_blocking(move || -> Result<StoreWriteLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| StoreError::Lock(format!("open {}: {err}", path.display())))?;

        let start = Instant::now();
        file.lock_exclusive()
            .map_err(|err| StoreError::Lock(format!("acquire {}: {err}", path.display())))?;
        let waited = start.elapsed().as_millis() as u64;
        STORE_LOCK_WAIT_MS_LAST.store(waited, Ordering::Relaxed);
        if waited > 1_000 {
            log::info!("Waited {waited}ms for knowledge base lock {}", path.display());
        }

        Ok(StoreWriteLock { file })
    })
    .await
    .map_err(|err| StoreError::Lock(format!("join lock task: {err}")))?
}
