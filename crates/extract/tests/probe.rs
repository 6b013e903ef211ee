use precheck_extract::{DefaultsExtractor, ExtractError, ProbeExtractor};
use precheck_model::{Component, ExtractionMethod, Value, Version};
use std::time::Duration;
use tempfile::TempDir;

const PROBE_JSON: &str = r#"{
  "config": {"schedule": {"max-merge-region-size": 54, "enable-cross-table-merge": true}},
  "sysvars": {}
}"#;

#[tokio::test]
async fn probe_reads_command_output() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("v7.5.0.json"), PROBE_JSON).unwrap();

    let probe = ProbeExtractor::new(Component::PD, "cat {root}/{version}.json");
    assert_eq!(probe.method(), ExtractionMethod::BinaryProbe);
    let extracted = probe
        .extract(tmp.path(), &Version::parse("v7.5.0").unwrap())
        .await
        .unwrap();
    assert_eq!(extracted.method, ExtractionMethod::BinaryProbe);
    assert_eq!(extracted.config["schedule.max-merge-region-size"], Value::Int(54));
    assert_eq!(extracted.config["schedule.enable-cross-table-merge"], Value::Bool(true));
    assert_eq!(extracted.bootstrap_version, None);
}

#[tokio::test]
async fn primary_probe_falls_back_to_source_bootstrap_version() {
    let tmp = TempDir::new().unwrap();
    let bootstrap = tmp.path().join("pkg/session/bootstrap.go");
    std::fs::create_dir_all(bootstrap.parent().unwrap()).unwrap();
    std::fs::write(
        &bootstrap,
        "package session\n\nvar currentBootstrapVersion int64 = 146\n",
    )
    .unwrap();

    let probe = ProbeExtractor::new(
        Component::TiDB,
        r#"echo '{"config": {"port": 4000}, "sysvars": {"tidb_txn_mode": "pessimistic"}}'"#,
    );
    let extracted = probe
        .extract(tmp.path(), &Version::parse("v7.1.0").unwrap())
        .await
        .unwrap();
    assert_eq!(extracted.bootstrap_version, Some(146));
    assert_eq!(
        extracted.system_variables["tidb_txn_mode"],
        Value::String("pessimistic".into())
    );
}

#[tokio::test]
async fn failing_and_slow_probes_are_errors() {
    let tmp = TempDir::new().unwrap();
    let version = Version::parse("v7.1.0").unwrap();

    let failing = ProbeExtractor::new(Component::PD, "echo broken >&2; exit 3");
    let err = failing.extract(tmp.path(), &version).await.unwrap_err();
    assert!(matches!(err, ExtractError::Probe(ref msg) if msg.contains("broken")), "{err}");

    let slow = ProbeExtractor::new(Component::PD, "sleep 5").with_timeout(Duration::from_millis(100));
    let err = slow.extract(tmp.path(), &version).await.unwrap_err();
    assert!(matches!(err, ExtractError::Timeout(_)), "{err}");

    let empty = ProbeExtractor::new(Component::PD, r#"echo '{"config": {}}'"#);
    let err = empty.extract(tmp.path(), &version).await.unwrap_err();
    assert!(matches!(err, ExtractError::Empty(Component::PD)), "{err}");
}

#[tokio::test]
async fn location_labels_keep_their_order() {
    let tmp = TempDir::new().unwrap();
    let probe = ProbeExtractor::new(
        Component::PD,
        r#"echo '{"config": {"replication": {"location-labels": ["zone", "rack", "host"]}}}'"#,
    );
    let extracted = probe
        .extract(tmp.path(), &Version::parse("v7.1.0").unwrap())
        .await
        .unwrap();
    assert!(extracted.order_sensitive.contains("replication.location-labels"));

    let snapshot = extracted.into_snapshot(Component::PD, Version::parse("v7.1.0").unwrap(), 0);
    assert!(snapshot.is_order_sensitive("replication.location-labels"));
    let reordered = Value::StringList(vec!["host".into(), "rack".into(), "zone".into()]);
    assert!(!snapshot.config_defaults["replication.location-labels"].equals(&reordered, true));
}
