use crate::error::{BuildError, Result};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

const GIT_QUICK_TIMEOUT: Duration = Duration::from_secs(10);
const GIT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(300);

async fn run_git(repo: &Path, args: &[&str], limit: Duration) -> Result<String> {
    let command = args.first().copied().unwrap_or("git").to_string();
    let output = timeout(
        limit,
        tokio::process::Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(args)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| BuildError::git(&command, repo, format!("timed out after {limit:?}")))?
    .map_err(|e| BuildError::git(&command, repo, e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BuildError::git(&command, repo, stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether `path` is inside a git work tree.
pub async fn is_git_repository(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    run_git(path, &["rev-parse", "--is-inside-work-tree"], GIT_QUICK_TIMEOUT)
        .await
        .is_ok_and(|out| out == "true")
}

pub async fn list_tags(repo: &Path) -> Result<Vec<String>> {
    let out = run_git(repo, &["tag", "--list"], GIT_QUICK_TIMEOUT).await?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

pub async fn rev_parse(repo: &Path, rev: &str) -> Result<String> {
    let spec = format!("{rev}^{{commit}}");
    run_git(repo, &["rev-parse", "--verify", &spec], GIT_QUICK_TIMEOUT).await
}

pub async fn worktree_add(repo: &Path, path: &Path) -> Result<()> {
    let path = path.to_string_lossy();
    run_git(
        repo,
        &["worktree", "add", "--force", "--detach", &path, "HEAD"],
        GIT_CHECKOUT_TIMEOUT,
    )
    .await
    .map(|_| ())
}

pub async fn worktree_remove(repo: &Path, path: &Path) -> Result<()> {
    let path = path.to_string_lossy();
    run_git(repo, &["worktree", "remove", "--force", &path], GIT_QUICK_TIMEOUT)
        .await
        .map(|_| ())
}

pub async fn worktree_prune(repo: &Path) -> Result<()> {
    run_git(repo, &["worktree", "prune"], GIT_QUICK_TIMEOUT)
        .await
        .map(|_| ())
}

/// Detached, forced checkout of `rev` in a worktree; untracked build output is left alone.
pub async fn checkout(worktree: &Path, rev: &str) -> Result<String> {
    run_git(
        worktree,
        &["checkout", "--force", "--detach", rev],
        GIT_CHECKOUT_TIMEOUT,
    )
    .await?;
    rev_parse(worktree, "HEAD").await
}

/// Remove the `index.lock` a killed git process left in `worktree`'s git dir.
///
/// Only valid while the caller holds the worktree exclusively.
pub async fn clear_stale_index_lock(worktree: &Path) -> Result<bool> {
    let git_dir = run_git(worktree, &["rev-parse", "--absolute-git-dir"], GIT_QUICK_TIMEOUT).await?;
    let lock = Path::new(&git_dir).join("index.lock");
    match tokio::fs::remove_file(&lock).await {
        Ok(()) => {
            log::warn!("Removed stale {}", lock.display());
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(BuildError::git(
            "rev-parse",
            worktree,
            format!("cannot remove {}: {err}", lock.display()),
        )),
    }
}
