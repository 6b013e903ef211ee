//! # Runtime collection
//!
//! Reads the effective configuration of a live cluster.
//!
//! ```text
//! PD       GET /pd/api/v1/config, /pd/api/v1/status
//! TiKV     GET /config, /status          (status port)
//! TiFlash  GET /config, /status          (proxy status port)
//! TiDB     GET /config, /status          (status port)
//!          SHOW GLOBAL VARIABLES         (SQL port)
//! ```
//!
//! Nested JSON is flattened to dotted names and every name passes through the
//! knowledge base rename table, so observations line up with snapshot keys.

mod cluster;
mod endpoint;
mod error;
mod http;
mod tidb;

use async_trait::async_trait;
use precheck_model::{Component, RuntimeSnapshot};

pub use cluster::{
    canonicalize, collect_cluster, load_cluster_snapshot, save_cluster_snapshot, ClusterCollector,
};
pub use endpoint::{derive_tidb_status_address, parse_reported_version, split_host_port, Endpoint};
pub use error::{CollectError, Result};
pub use http::HttpConfigCollector;
pub use tidb::{MysqlVariableSource, TidbCollector, VariableSource};

/// Reads one component's runtime configuration.
#[async_trait]
pub trait ComponentCollector: Send + Sync {
    fn component(&self) -> Component;

    /// Try each address in order; the first that answers wins.
    async fn collect(&self, endpoint: &Endpoint) -> Result<RuntimeSnapshot>;
}
