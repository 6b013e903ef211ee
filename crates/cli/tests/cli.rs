use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn precheck_cmd() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("upgrade-precheck").expect("upgrade-precheck binary");
    cmd.env_remove("UPGRADE_PRECHECK_KB_DIR")
        .env_remove("UPGRADE_PRECHECK_GENERATE_CONCURRENCY")
        .env("RUST_LOG", "warn");
    cmd
}

/// Two PD release directories whose leader-schedule-limit default moves from 4 to 8.
fn write_pd_releases(root: &Path) {
    for (tag, limit) in [("v7.1.0", 4), ("v7.1.1", 8)] {
        let dir = root.join(tag);
        std::fs::create_dir_all(&dir).unwrap();
        let payload = serde_json::json!({
            "config": {"schedule": {"leader-schedule-limit": limit}}
        });
        std::fs::write(dir.join("defaults.json"), payload.to_string()).unwrap();
    }
}

fn write_config(dir: &Path, pd_root: &Path) -> std::path::PathBuf {
    let path = dir.join("precheck.toml");
    let body = format!(
        r#"
release_lines = ["v7.1"]

[repositories.pd]
path = "{}"
layout = "directories"
strategy = "probe"
probe_command = "cat {{root}}/defaults.json"
"#,
        pd_root.display()
    );
    std::fs::write(&path, body).unwrap();
    path
}

fn generate(kb: &Path, config: &Path) -> Value {
    let output = precheck_cmd()
        .args(["generate", "--no-upgrade-logic", "--config"])
        .arg(config)
        .arg("--kb-dir")
        .arg(kb)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn ledger_on_empty_knowledge_base() {
    let kb = TempDir::new().unwrap();
    let output = precheck_cmd()
        .arg("ledger")
        .arg("--kb-dir")
        .arg(kb.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let ledger: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(ledger["schema_version"], 1);
}

#[test]
fn generate_writes_snapshots_and_ledger() {
    let work = TempDir::new().unwrap();
    let pd_root = work.path().join("pd");
    write_pd_releases(&pd_root);
    let config = write_config(work.path(), &pd_root);
    let kb = work.path().join("kb");

    let report = generate(&kb, &config);
    assert_eq!(report["summary"]["generated"], 2);
    for tag in ["v7.1.0", "v7.1.1"] {
        assert!(kb.join("v7.1").join(tag).join("pd").join("defaults.json").is_file());
    }

    let ledger = precheck_cmd()
        .arg("ledger")
        .arg("--kb-dir")
        .arg(&kb)
        .output()
        .unwrap();
    let ledger: Value = serde_json::from_slice(&ledger.stdout).unwrap();
    assert!(ledger["versions"].get("v7.1.1").is_some(), "{ledger}");
}

#[test]
fn missing_repository_exits_with_two() {
    let work = TempDir::new().unwrap();
    let config = write_config(work.path(), &work.path().join("does-not-exist"));
    precheck_cmd()
        .args(["generate", "--no-upgrade-logic", "--config"])
        .arg(&config)
        .arg("--kb-dir")
        .arg(work.path().join("kb"))
        .assert()
        .code(2);
}

#[test]
fn precheck_reports_unchanged_default_as_p1() {
    let work = TempDir::new().unwrap();
    let pd_root = work.path().join("pd");
    write_pd_releases(&pd_root);
    let config = write_config(work.path(), &pd_root);
    let kb = work.path().join("kb");
    generate(&kb, &config);

    let snapshot = work.path().join("cluster.json");
    let cluster = serde_json::json!({
        "snapshots": {
            "pd": {
                "collected_at_unix_ms": 1,
                "component": "pd",
                "address": "127.0.0.1:2379",
                "config": {
                    "schedule.leader-schedule-limit": {"type": "int", "value": 4}
                }
            }
        }
    });
    std::fs::write(&snapshot, cluster.to_string()).unwrap();

    let output = precheck_cmd()
        .args(["precheck", "--current", "v7.1.0", "--target", "v7.1.1", "--component", "pd"])
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--kb-dir")
        .arg(&kb)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["p1"], 1, "{report}");
    let record = &report["records"][0];
    assert_eq!(record["parameter_name"], "schedule.leader-schedule-limit");
    assert_eq!(record["severity"], "P1");
    assert_eq!(record["reason"], "default_changed");
}

#[test]
fn precheck_rejects_downgrade() {
    let kb = TempDir::new().unwrap();
    precheck_cmd()
        .args(["precheck", "--current", "v7.1.1", "--target", "v7.1.0"])
        .arg("--kb-dir")
        .arg(kb.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("upgrade plan"));
}

#[test]
fn filters_init_writes_the_builtin_table_once() {
    let kb = TempDir::new().unwrap();
    let output = precheck_cmd()
        .args(["filters", "--init"])
        .arg("--kb-dir")
        .arg(kb.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let policy: Value = serde_json::from_slice(&output.stdout).unwrap();
    let rules = policy["filters"]["rules"].as_array().unwrap();
    assert!(rules
        .iter()
        .any(|r| r["match"] == "exact" && r["pattern"] == "data-dir" && r["reason"] == "path"));
    assert!(kb.path().join("filters.json").is_file());

    std::fs::write(kb.path().join("filters.json"), r#"{"rules": []}"#).unwrap();
    let output = precheck_cmd()
        .args(["filters", "--init"])
        .arg("--kb-dir")
        .arg(kb.path())
        .output()
        .unwrap();
    let policy: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(policy["filters"]["rules"], serde_json::json!([]));
}
