use precheck_model::{
    Component, DurationValue, ExtractionMethod, FilterReason, FilterRule, FilterTable,
    ForcedMutation, HighRiskParameter, HighRiskTable, NamePattern, ParameterKind, RenameRule,
    RenameTable, Value, Version, VersionSnapshot,
};
use precheck_store::{StoreError, VersionStore, WriteMode};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn v(tag: &str) -> Version {
    Version::parse(tag).expect("version")
}

fn snapshot(component: Component, tag: &str) -> VersionSnapshot {
    let mut snap = VersionSnapshot::new(component, v(tag), ExtractionMethod::SourceParse);
    snap.generated_at_unix_ms = 1_700_000_000_000;
    snap.config_defaults
        .insert("schedule.low-space-ratio".into(), Value::Float(0.8));
    snap.config_defaults.insert(
        "schedule.patrol-region-interval".into(),
        Value::Duration(DurationValue::from_millis(10)),
    );
    snap.config_defaults.insert(
        "replication.location-labels".into(),
        Value::StringList(vec!["zone".into(), "host".into()]),
    );
    snap
}

fn forced(name: &str, at: i64) -> ForcedMutation {
    ForcedMutation {
        component: Component::TiDB,
        kind: ParameterKind::SystemVariable,
        parameter_name: name.into(),
        from_value: None,
        to_value: Value::Bool(true),
        introduced_at_bootstrap_version: at,
        description: String::new(),
        source_function: format!("upgradeToVer{at}"),
    }
}

#[tokio::test]
async fn put_get_preserves_types_and_values() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VersionStore::open(tmp.path()).await.expect("open");
    let snap = snapshot(Component::PD, "v7.1.0");

    let outcome = store.put(&snap, WriteMode::Create).await.expect("put");
    assert!(!outcome.replaced);
    assert!(outcome.path.ends_with("v7.1/v7.1.0/pd/defaults.json"));

    let back = store.get(&v("v7.1.0"), Component::PD).await.expect("get");
    assert_eq!(back, snap);
}

#[tokio::test]
async fn put_conflicts_without_force_and_keeps_bytes() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VersionStore::open(tmp.path()).await.expect("open");
    let snap = snapshot(Component::TiKV, "v6.5.0");
    let first = store.put(&snap, WriteMode::Create).await.expect("put");
    let before = tokio::fs::read(&first.path).await.expect("read");

    let mut changed = snap.clone();
    changed.generated_at_unix_ms += 1;
    let err = store
        .put(&changed, WriteMode::Create)
        .await
        .expect_err("conflict");
    assert!(err.is_conflict());
    assert_eq!(tokio::fs::read(&first.path).await.expect("read"), before);

    let forced = store.put(&changed, WriteMode::Force).await.expect("force");
    assert!(forced.replaced);
    assert_ne!(forced.digest, first.digest);
}

#[tokio::test]
async fn missing_snapshot_is_not_found() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VersionStore::open(tmp.path()).await.expect("open");
    let err = store
        .get(&v("v8.1.0"), Component::TiDB)
        .await
        .expect_err("missing");
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn list_versions_is_semantic_and_per_component() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VersionStore::open(tmp.path()).await.expect("open");
    for tag in ["v7.1.10", "v6.5.0", "v7.1.2", "v7.5.0-rc.1", "v7.5.0"] {
        store
            .put(&snapshot(Component::PD, tag), WriteMode::Create)
            .await
            .expect("put");
    }
    store
        .put(&snapshot(Component::TiKV, "v8.1.0"), WriteMode::Create)
        .await
        .expect("put");

    let tags: Vec<String> = store
        .list_versions(Component::PD)
        .await
        .expect("list")
        .iter()
        .map(Version::to_string)
        .collect();
    assert_eq!(
        tags,
        vec!["v6.5.0", "v7.1.2", "v7.1.10", "v7.5.0-rc.1", "v7.5.0"]
    );

    assert!(store.delete(&v("v7.1.2"), Component::PD).await.expect("delete"));
    assert!(!store.delete(&v("v7.1.2"), Component::PD).await.expect("delete"));
    assert_eq!(store.list_versions(Component::PD).await.expect("list").len(), 4);
    assert_eq!(store.list_versions(Component::TiFlash).await.expect("list").len(), 0);
}

#[tokio::test]
async fn upgrade_logic_only_grows() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VersionStore::open(tmp.path()).await.expect("open");
    assert!(store.get_upgrade_logic().await.expect("empty").is_empty());

    let first = store
        .put_upgrade_logic(vec![forced("a", 90), forced("b", 95)])
        .await
        .expect("append");
    assert_eq!((first.added, first.total), (2, 2));

    let second = store
        .put_upgrade_logic(vec![forced("b", 95), forced("c", 92)])
        .await
        .expect("append");
    assert_eq!((second.added, second.total), (1, 3));

    let names: Vec<String> = store
        .get_upgrade_logic()
        .await
        .expect("load")
        .mutations
        .into_iter()
        .map(|m| m.parameter_name)
        .collect();
    assert_eq!(names, vec!["a", "c", "b"]);
}

#[tokio::test]
async fn ledger_and_renames_persist() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VersionStore::open(tmp.path()).await.expect("open");
    assert!(!store.is_generated(&v("v7.1.0")).await.expect("ledger"));
    store
        .mark_generated(&v("v7.1.0"), Component::TiDB, Some("deadbeef".into()), None)
        .await
        .expect("mark");
    assert!(store.is_generated(&v("v7.1.0")).await.expect("ledger"));
    let ledger = store.load_ledger().await.expect("ledger");
    assert!(ledger.last_run_at_unix_ms > 0);

    let table = RenameTable::new(vec![RenameRule {
        component: Component::TiDB,
        kind: ParameterKind::Config,
        from: "log.slow-threshold".into(),
        to: "instance.tidb_slow_log_threshold".into(),
        since: Some(v("v6.1.0")),
        alias: false,
    }]);
    store.save_rename_table(&table).await.expect("save");
    assert_eq!(store.rename_table().await.expect("load"), table);
}

#[tokio::test]
async fn write_lock_is_reacquirable_after_drop() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VersionStore::open(tmp.path()).await.expect("open");
    let guard = store.lock().await.expect("lock");
    drop(guard);
    let _again = store.lock().await.expect("relock");
}

#[tokio::test]
async fn filter_table_defaults_to_builtin_until_saved() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VersionStore::open(tmp.path()).await.expect("open");
    assert_eq!(store.filter_table().await.expect("filters"), FilterTable::builtin());
    assert!(store.high_risk_table().await.expect("high risk").is_empty());

    let filters = FilterTable::new(
        vec![FilterRule::new(NamePattern::Exact("data-dir".into()), FilterReason::Path)],
        [],
    );
    store.save_filter_table(&filters).await.expect("save");
    assert_eq!(store.filter_table().await.expect("filters"), filters);

    let high_risk = HighRiskTable::new(vec![HighRiskParameter {
        component: Component::TiKV,
        kind: ParameterKind::Config,
        name: "storage.engine".into(),
        note: "engine switch requires data migration".into(),
        allowed_values: vec![Value::string("raft-kv")],
    }]);
    store.save_high_risk_table(&high_risk).await.expect("save");
    assert_eq!(store.high_risk_table().await.expect("high risk"), high_risk);
}
