use precheck_builder::{git, WorktreePool};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn run(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["-c", "user.name=precheck", "-c", "user.email=precheck@localhost"])
        .args(args)
        .output()
        .expect("git is installed");
    assert!(output.status.success(), "git {args:?}: {}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository with two tagged commits of `defaults.txt`.
fn tagged_repo(root: &Path) {
    run(root, &["init", "--quiet"]);
    for (tag, body) in [("v7.1.0", "4"), ("v7.1.1", "8")] {
        std::fs::write(root.join("defaults.txt"), body).unwrap();
        run(root, &["add", "defaults.txt"]);
        run(root, &["commit", "--quiet", "-m", tag]);
        run(root, &["tag", tag]);
    }
}

#[tokio::test]
async fn reused_worktree_recovers_from_a_killed_checkout() {
    let repo = TempDir::new().unwrap();
    let trees = TempDir::new().unwrap();
    tagged_repo(repo.path());
    let pool = WorktreePool::new(repo.path(), trees.path(), "pd", 1);

    let lease = pool.lease().await.unwrap();
    let worktree = lease.path().to_path_buf();
    git::checkout(&worktree, "v7.1.0").await.unwrap();
    // What a checkout killed on timeout leaves behind.
    let git_dir = run(&worktree, &["rev-parse", "--absolute-git-dir"]);
    let lock = Path::new(&git_dir).join("index.lock");
    std::fs::write(&lock, b"").unwrap();
    drop(lease);

    let lease = pool.lease().await.unwrap();
    assert_eq!(lease.path(), worktree);
    assert!(!lock.exists());
    let commit = git::checkout(lease.path(), "v7.1.1").await.unwrap();
    assert_eq!(commit, run(repo.path(), &["rev-parse", "v7.1.1^{commit}"]));
    assert_eq!(std::fs::read_to_string(worktree.join("defaults.txt")).unwrap(), "8");

    drop(lease);
    pool.cleanup().await;
    assert!(!worktree.exists());
}

#[tokio::test]
async fn clearing_without_a_lock_is_a_no_op() {
    let repo = TempDir::new().unwrap();
    tagged_repo(repo.path());
    assert!(!git::clear_stale_index_lock(repo.path()).await.unwrap());
}
