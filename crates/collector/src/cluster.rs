use crate::endpoint::Endpoint;
use crate::error::{CollectError, Result};
use crate::http::HttpConfigCollector;
use crate::tidb::{MysqlVariableSource, TidbCollector};
use crate::ComponentCollector;
use precheck_model::{ClusterSnapshot, Component, ParameterKind, RenameTable, RuntimeSnapshot};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Collects every configured component concurrently into one `ClusterSnapshot`.
pub struct ClusterCollector {
    collectors: BTreeMap<Component, Arc<dyn ComponentCollector>>,
    renames: RenameTable,
    timeout: Duration,
}

impl ClusterCollector {
    /// HTTP collectors for every component, TiDB variables over MySQL as `root`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let variables = Arc::new(MysqlVariableSource::new("root", None, timeout));
        Ok(Self::empty(timeout)
            .with_collector(Arc::new(HttpConfigCollector::pd(timeout)?))
            .with_collector(Arc::new(HttpConfigCollector::tikv(timeout)?))
            .with_collector(Arc::new(HttpConfigCollector::tiflash(timeout)?))
            .with_collector(Arc::new(TidbCollector::new(timeout, Some(variables))?)))
    }

    pub fn empty(timeout: Duration) -> Self {
        Self {
            collectors: BTreeMap::new(),
            renames: RenameTable::default(),
            timeout,
        }
    }

    /// Register or replace the collector for its component.
    pub fn with_collector(mut self, collector: Arc<dyn ComponentCollector>) -> Self {
        self.collectors.insert(collector.component(), collector);
        self
    }

    pub fn with_renames(mut self, renames: RenameTable) -> Self {
        self.renames = renames;
        self
    }

    /// Unreachable components are recorded, never raised.
    pub async fn collect(&self, endpoints: &[Endpoint]) -> ClusterSnapshot {
        let mut cluster = ClusterSnapshot::default();
        let mut join = JoinSet::new();
        for endpoint in endpoints {
            let Some(collector) = self.collectors.get(&endpoint.component).cloned() else {
                log::warn!("No collector for {}", endpoint.component);
                cluster.mark_unreachable(endpoint.component, "no collector registered");
                continue;
            };
            let endpoint = endpoint.clone();
            let limit = self.timeout;
            join.spawn(async move {
                let component = endpoint.component;
                let result = match tokio::time::timeout(limit, collector.collect(&endpoint)).await {
                    Ok(result) => result,
                    Err(_) => Err(CollectError::unreachable(
                        component,
                        &endpoint.addresses,
                        format!("timed out after {limit:?}"),
                    )),
                };
                (component, result)
            });
        }

        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((_, Ok(snapshot))) => {
                    log::info!(
                        "{} collected from {} ({} config items, {} variables)",
                        snapshot.component,
                        snapshot.address,
                        snapshot.config.len(),
                        snapshot.system_variables.len()
                    );
                    cluster.insert(canonicalize(snapshot, &self.renames));
                }
                Ok((component, Err(err))) => {
                    log::warn!("{err}");
                    cluster.mark_unreachable(component, err.to_string());
                }
                Err(err) => log::warn!("Collector task aborted: {err}"),
            }
        }
        cluster
    }
}

/// Collect with the default collectors and an empty rename table.
pub async fn collect_cluster(endpoints: &[Endpoint], timeout: Duration) -> Result<ClusterSnapshot> {
    Ok(ClusterCollector::new(timeout)?.collect(endpoints).await)
}

/// Rewrite observed names to their canonical spelling; the first spelling wins on collision.
pub fn canonicalize(mut snapshot: RuntimeSnapshot, renames: &RenameTable) -> RuntimeSnapshot {
    let component = snapshot.component;
    for kind in [ParameterKind::Config, ParameterKind::SystemVariable] {
        let values = std::mem::take(snapshot.values_mut(kind));
        let mut canonical = BTreeMap::new();
        for (name, value) in values {
            canonical
                .entry(renames.canonicalize(component, kind, &name))
                .or_insert(value);
        }
        *snapshot.values_mut(kind) = canonical;
    }
    snapshot
}

pub async fn save_cluster_snapshot(path: &Path, cluster: &ClusterSnapshot) -> Result<()> {
    precheck_store::io::write_json_atomic(path, cluster).await?;
    Ok(())
}

pub async fn load_cluster_snapshot(path: &Path) -> Result<ClusterSnapshot> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
