use crate::endpoint::{split_host_port, Endpoint};
use crate::error::{CollectError, Result};
use crate::http::HttpConfigCollector;
use crate::ComponentCollector;
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use precheck_model::{current_unix_ms, Component, RuntimeSnapshot, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SQL_PORT: u16 = 4000;

/// Reads global system variables from a TiDB SQL endpoint.
#[async_trait]
pub trait VariableSource: Send + Sync {
    async fn global_variables(&self, sql_address: &str) -> Result<BTreeMap<String, String>>;
}

/// `SHOW GLOBAL VARIABLES` over the MySQL protocol.
#[derive(Debug, Clone)]
pub struct MysqlVariableSource {
    user: String,
    password: Option<String>,
    timeout: Duration,
}

impl MysqlVariableSource {
    pub fn new(user: impl Into<String>, password: Option<String>, timeout: Duration) -> Self {
        Self {
            user: user.into(),
            password,
            timeout,
        }
    }
}

impl Default for MysqlVariableSource {
    fn default() -> Self {
        Self::new("root", None, crate::http::DEFAULT_HTTP_TIMEOUT)
    }
}

#[async_trait]
impl VariableSource for MysqlVariableSource {
    async fn global_variables(&self, sql_address: &str) -> Result<BTreeMap<String, String>> {
        let (host, port) = split_host_port(sql_address, DEFAULT_SQL_PORT)?;
        let sql_error = |e: mysql_async::Error| CollectError::Sql {
            address: sql_address.to_string(),
            message: e.to_string(),
        };
        let opts = mysql_async::OptsBuilder::default()
            .ip_or_hostname(host)
            .tcp_port(port)
            .user(Some(self.user.clone()))
            .pass(self.password.clone());

        let query = async {
            let mut conn = mysql_async::Conn::new(opts).await.map_err(sql_error)?;
            let rows: Vec<(String, Option<String>)> =
                conn.query("SHOW GLOBAL VARIABLES").await.map_err(sql_error)?;
            if let Err(err) = conn.disconnect().await {
                log::debug!("Disconnect from {sql_address} failed: {err}");
            }
            Ok::<_, CollectError>(rows)
        };
        let rows = tokio::time::timeout(self.timeout, query)
            .await
            .map_err(|_| CollectError::Sql {
                address: sql_address.to_string(),
                message: format!("timed out after {:?}", self.timeout),
            })??;
        Ok(rows
            .into_iter()
            .map(|(name, value)| (name, value.unwrap_or_default()))
            .collect())
    }
}

/// Config over the status port plus global variables over SQL.
pub struct TidbCollector {
    http: HttpConfigCollector,
    variables: Option<Arc<dyn VariableSource>>,
}

impl TidbCollector {
    pub fn new(timeout: Duration, variables: Option<Arc<dyn VariableSource>>) -> Result<Self> {
        Ok(Self {
            http: HttpConfigCollector::new(Component::TiDB, "/config", "/status", timeout)?,
            variables,
        })
    }

    async fn collect_variables(&self, endpoint: &Endpoint) -> Option<Result<BTreeMap<String, Value>>> {
        let source = self.variables.as_ref()?;
        let address = endpoint.sql_address.as_deref()?;
        Some(source.global_variables(address).await.map(|vars| {
            vars.into_iter()
                .map(|(name, raw)| (name.to_ascii_lowercase(), Value::String(raw)))
                .collect()
        }))
    }
}

#[async_trait]
impl ComponentCollector for TidbCollector {
    fn component(&self) -> Component {
        Component::TiDB
    }

    async fn collect(&self, endpoint: &Endpoint) -> Result<RuntimeSnapshot> {
        if endpoint.addresses.is_empty() && endpoint.sql_address.is_none() {
            return Err(CollectError::NoAddress(Component::TiDB));
        }
        let http = self.http.collect(endpoint);
        let variables = self.collect_variables(endpoint);
        let (http, variables) = tokio::join!(http, variables);

        let mut tried = endpoint.addresses.clone();
        tried.extend(endpoint.sql_address.iter().cloned());
        match (http, variables) {
            (Ok(mut snapshot), Some(Ok(vars))) => {
                snapshot.system_variables = vars;
                Ok(snapshot)
            }
            (Ok(snapshot), Some(Err(err))) => {
                log::warn!("TiDB global variables unavailable: {err}");
                Ok(snapshot)
            }
            (Ok(snapshot), None) => Ok(snapshot),
            (Err(err), Some(Ok(vars))) => {
                log::warn!("TiDB config unavailable, using global variables only: {err}");
                let address = endpoint.sql_address.clone().unwrap_or_default();
                let mut snapshot = RuntimeSnapshot::new(Component::TiDB, address, current_unix_ms());
                snapshot.system_variables = vars;
                Ok(snapshot)
            }
            (Err(http_err), Some(Err(sql_err))) => Err(CollectError::unreachable(
                Component::TiDB,
                &tried,
                format!("{http_err}; {sql_err}"),
            )),
            (Err(err), None) => Err(CollectError::unreachable(Component::TiDB, &tried, err.to_string())),
        }
    }
}
