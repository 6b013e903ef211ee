use crate::error::{CollectError, Result};
use once_cell::sync::Lazy;
use precheck_model::{Component, Version};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Offset between TiDB's SQL port and its status port (4000 -> 10080).
const TIDB_STATUS_PORT_OFFSET: u16 = 6080;
const TIDB_DEFAULT_SQL_PORT: u16 = 4000;

static VERSION_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"v?\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?").expect("valid regex"));

/// Where to reach one component.
///
/// `addresses` are HTTP `host:port` pairs tried in order. TiDB additionally
/// carries the SQL address used for global variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub component: Component,
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_address: Option<String>,
}

impl Endpoint {
    pub fn new(component: Component, addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            component,
            addresses: addresses.into_iter().map(Into::into).collect(),
            sql_address: None,
        }
    }

    /// A TiDB endpoint; without status addresses the status port is derived from the SQL port.
    pub fn tidb(sql_address: Option<String>, status_addresses: Vec<String>) -> Result<Self> {
        let addresses = if status_addresses.is_empty() {
            match &sql_address {
                Some(sql) => vec![derive_tidb_status_address(sql)?],
                None => Vec::new(),
            }
        } else {
            status_addresses
        };
        Ok(Self {
            component: Component::TiDB,
            addresses,
            sql_address,
        })
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts and a missing port.
pub fn split_host_port(address: &str, default_port: u16) -> Result<(String, u16)> {
    let address = address.trim();
    let address = address
        .strip_prefix("http://")
        .or_else(|| address.strip_prefix("https://"))
        .unwrap_or(address)
        .trim_end_matches('/');
    if address.is_empty() {
        return Err(CollectError::InvalidAddress(address.to_string()));
    }
    let (host, port) = match address.rfind(':') {
        // A bare IPv6 literal has several colons and no brackets.
        Some(idx) if !address[..idx].contains(':') || address.starts_with('[') => {
            let port = address[idx + 1..]
                .parse::<u16>()
                .map_err(|_| CollectError::InvalidAddress(address.to_string()))?;
            (&address[..idx], port)
        }
        _ => (address, default_port),
    };
    Ok((host.trim_start_matches('[').trim_end_matches(']').to_string(), port))
}

pub fn derive_tidb_status_address(sql_address: &str) -> Result<String> {
    let (host, port) = split_host_port(sql_address, TIDB_DEFAULT_SQL_PORT)?;
    let status_port = port
        .checked_add(TIDB_STATUS_PORT_OFFSET)
        .ok_or_else(|| CollectError::InvalidAddress(sql_address.to_string()))?;
    if host.contains(':') {
        Ok(format!("[{host}]:{status_port}"))
    } else {
        Ok(format!("{host}:{status_port}"))
    }
}

pub(crate) fn base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Release version from a reported version string such as `8.0.11-TiDB-v7.1.0`.
pub fn parse_reported_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    let candidate = raw.rsplit_once("-TiDB-").map_or(raw, |(_, rest)| rest);
    if let Ok(version) = Version::parse(candidate) {
        return Some(version);
    }
    VERSION_IN_TEXT
        .find_iter(candidate)
        .find_map(|m| Version::parse(m.as_str()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_forms() {
        assert_eq!(split_host_port("10.0.0.1:4000", 4000).unwrap(), ("10.0.0.1".into(), 4000));
        assert_eq!(split_host_port("tidb-0", 4000).unwrap(), ("tidb-0".into(), 4000));
        assert_eq!(split_host_port("[::1]:4001", 4000).unwrap(), ("::1".into(), 4001));
        assert_eq!(split_host_port("http://pd:2379/", 80).unwrap(), ("pd".into(), 2379));
        assert!(split_host_port("pd:notaport", 80).is_err());
    }

    #[test]
    fn status_address_follows_sql_port() {
        assert_eq!(derive_tidb_status_address("127.0.0.1:4000").unwrap(), "127.0.0.1:10080");
        assert_eq!(derive_tidb_status_address("tidb").unwrap(), "tidb:10080");
        assert_eq!(derive_tidb_status_address("[::1]:4001").unwrap(), "[::1]:10081");
    }

    #[test]
    fn reported_versions() {
        let v = |s: &str| Some(Version::parse(s).unwrap());
        assert_eq!(parse_reported_version("8.0.11-TiDB-v7.1.0"), v("v7.1.0"));
        assert_eq!(parse_reported_version("v7.5.1"), v("v7.5.1"));
        assert_eq!(parse_reported_version("7.1.2"), v("v7.1.2"));
        assert_eq!(parse_reported_version("Release Version: v6.5.3\nEdition: Community"), v("v6.5.3"));
        assert_eq!(parse_reported_version("unknown"), None);
    }
}
