use async_trait::async_trait;
use axum::routing::get;
use axum::{Json, Router};
use precheck_collector::{
    load_cluster_snapshot, save_cluster_snapshot, ClusterCollector, ComponentCollector, Endpoint,
    HttpConfigCollector, TidbCollector, VariableSource,
};
use precheck_model::{Component, ParameterKind, RenameRule, RenameTable, Value, Version};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr.to_string()
}

/// An address nothing listens on.
async fn dead_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

fn pd_router() -> Router {
    Router::new()
        .route(
            "/pd/api/v1/config",
            get(|| async {
                Json(json!({
                    "replication": {"max-replicas": 3, "location-labels": ["zone", "host"]},
                    "schedule": {"low-space-ratio": 0.8, "patrol-region-interval": "10ms"},
                }))
            }),
        )
        .route("/pd/api/v1/status", get(|| async { Json(json!({"version": "v7.1.0"})) }))
}

fn tikv_router() -> Router {
    Router::new()
        .route(
            "/config",
            get(|| async {
                Json(json!({
                    "storage": {"reserve-space": "5GiB", "scheduler-worker-pool-size": 4},
                    "raftstore": {"Raft-Log-Gc-Threshold": 50},
                }))
            }),
        )
        .route("/status", get(|| async { Json(json!({"version": "7.5.0"})) }))
}

fn tidb_router() -> Router {
    Router::new()
        .route(
            "/config",
            get(|| async { Json(json!({"log": {"slow-threshold": 300}, "mem-quota-query": 1073741824u64})) }),
        )
        .route("/status", get(|| async { Json(json!({"version": "8.0.11-TiDB-v7.1.0"})) }))
}

struct FakeVariables;

#[async_trait]
impl VariableSource for FakeVariables {
    async fn global_variables(&self, _sql_address: &str) -> precheck_collector::Result<BTreeMap<String, String>> {
        Ok(BTreeMap::from([
            ("TiDB_Enable_Old".to_string(), "ON".to_string()),
            ("tidb_mem_quota_query".to_string(), "1073741824".to_string()),
        ]))
    }
}

#[tokio::test]
async fn pd_config_is_flattened_and_versioned() {
    let addr = serve(pd_router()).await;
    let collector = HttpConfigCollector::pd(TIMEOUT).unwrap();
    let snapshot = collector
        .collect(&Endpoint::new(Component::PD, [addr.clone()]))
        .await
        .unwrap();

    assert_eq!(snapshot.address, addr);
    assert_eq!(snapshot.reported_version, Some(Version::parse("v7.1.0").unwrap()));
    assert_eq!(snapshot.config["replication.max-replicas"], Value::Int(3));
    assert_eq!(snapshot.config["schedule.low-space-ratio"], Value::Float(0.8));
    assert_eq!(
        snapshot.config["replication.location-labels"],
        Value::StringList(vec!["zone".into(), "host".into()])
    );
}

#[tokio::test]
async fn first_reachable_address_wins() {
    let dead = dead_address().await;
    let live = serve(tikv_router()).await;
    let collector = HttpConfigCollector::tikv(TIMEOUT).unwrap();
    let snapshot = collector
        .collect(&Endpoint::new(Component::TiKV, [dead.clone(), live.clone()]))
        .await
        .unwrap();
    assert_eq!(snapshot.address, live);
    assert_eq!(snapshot.reported_version, Some(Version::parse("v7.5.0").unwrap()));

    let err = collector
        .collect(&Endpoint::new(Component::TiKV, [dead]))
        .await
        .unwrap_err();
    assert!(err.is_unreachable(), "{err}");
}

#[tokio::test]
async fn cluster_collection_keeps_partial_results() {
    let pd = serve(pd_router()).await;
    let tikv = serve(tikv_router()).await;
    let tidb = serve(tidb_router()).await;
    let dead = dead_address().await;

    let renames = RenameTable::new(vec![RenameRule {
        component: Component::TiDB,
        kind: ParameterKind::SystemVariable,
        from: "tidb_enable_old".into(),
        to: "tidb_enable_new".into(),
        since: None,
        alias: true,
    }]);
    let collector = ClusterCollector::empty(TIMEOUT)
        .with_collector(Arc::new(HttpConfigCollector::pd(TIMEOUT).unwrap()))
        .with_collector(Arc::new(HttpConfigCollector::tikv(TIMEOUT).unwrap()))
        .with_collector(Arc::new(HttpConfigCollector::tiflash(TIMEOUT).unwrap()))
        .with_collector(Arc::new(
            TidbCollector::new(TIMEOUT, Some(Arc::new(FakeVariables))).unwrap(),
        ))
        .with_renames(renames);

    let endpoints = vec![
        Endpoint::new(Component::PD, [pd]),
        Endpoint::new(Component::TiKV, [tikv]),
        Endpoint::new(Component::TiFlash, [dead]),
        Endpoint::tidb(Some("127.0.0.1:4000".into()), vec![tidb]).unwrap(),
    ];
    let cluster = collector.collect(&endpoints).await;

    assert_eq!(
        cluster.snapshots.keys().copied().collect::<Vec<_>>(),
        vec![Component::TiDB, Component::PD, Component::TiKV]
    );
    assert!(cluster.unreachable.contains_key(&Component::TiFlash));

    assert_eq!(
        cluster.observed(Component::TiDB, ParameterKind::SystemVariable, "tidb_enable_new"),
        Some(&Value::string("ON"))
    );
    assert_eq!(
        cluster.observed(Component::TiKV, ParameterKind::Config, "raftstore.raft-log-gc-threshold"),
        Some(&Value::Int(50))
    );
    assert_eq!(
        cluster.observed(Component::TiDB, ParameterKind::Config, "log.slow-threshold"),
        Some(&Value::Int(300))
    );
    let tidb = cluster.get(Component::TiDB).unwrap();
    assert_eq!(tidb.reported_version, Some(Version::parse("v7.1.0").unwrap()));

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cluster.json");
    save_cluster_snapshot(&path, &cluster).await.unwrap();
    assert_eq!(load_cluster_snapshot(&path).await.unwrap(), cluster);
}

#[tokio::test]
async fn tidb_falls_back_to_variables_when_status_port_is_down() {
    let dead = dead_address().await;
    let collector = TidbCollector::new(TIMEOUT, Some(Arc::new(FakeVariables))).unwrap();
    let endpoint = Endpoint::tidb(Some("127.0.0.1:4000".into()), vec![dead]).unwrap();
    let snapshot = collector.collect(&endpoint).await.unwrap();
    assert!(snapshot.config.is_empty());
    assert_eq!(snapshot.system_variables.len(), 2);
    assert_eq!(snapshot.address, "127.0.0.1:4000");
}

#[tokio::test]
async fn slow_component_times_out_without_blocking_the_rest() {
    let pd = serve(pd_router()).await;
    let stalled = serve(Router::new().route(
        "/config",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({}))
        }),
    ))
    .await;

    let limit = Duration::from_millis(300);
    let collector = ClusterCollector::empty(limit)
        .with_collector(Arc::new(HttpConfigCollector::pd(TIMEOUT).unwrap()))
        .with_collector(Arc::new(HttpConfigCollector::tikv(TIMEOUT).unwrap()));
    let endpoints = vec![
        Endpoint::new(Component::PD, [pd]),
        Endpoint::new(Component::TiKV, [stalled]),
    ];

    let started = std::time::Instant::now();
    let cluster = collector.collect(&endpoints).await;
    assert!(started.elapsed() < TIMEOUT, "took {:?}", started.elapsed());

    assert!(cluster.get(Component::PD).is_some());
    assert!(cluster.get(Component::TiKV).is_none());
    let reason = &cluster.unreachable[&Component::TiKV];
    assert!(reason.contains("timed out"), "{reason}");
}
