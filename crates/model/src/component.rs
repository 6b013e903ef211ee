use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cluster component a knowledge artifact or runtime observation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    #[serde(rename = "tidb")]
    TiDB,
    #[serde(rename = "pd")]
    PD,
    #[serde(rename = "tikv")]
    TiKV,
    #[serde(rename = "tiflash")]
    TiFlash,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::TiDB,
        Component::PD,
        Component::TiKV,
        Component::TiFlash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Component::TiDB => "tidb",
            Component::PD => "pd",
            Component::TiKV => "tikv",
            Component::TiFlash => "tiflash",
        }
    }

    /// The component whose snapshots carry the bootstrap version.
    pub fn is_primary(self) -> bool {
        self == Component::TiDB
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tidb" => Ok(Component::TiDB),
            "pd" => Ok(Component::PD),
            "tikv" => Ok(Component::TiKV),
            "tiflash" => Ok(Component::TiFlash),
            other => Err(ModelError::UnknownComponent(other.to_string())),
        }
    }
}

/// Whether a parameter is a configuration item or a system variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Config,
    SystemVariable,
}

impl ParameterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterKind::Config => "config",
            ParameterKind::SystemVariable => "system_variable",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a parameter across the knowledge base: (component, kind, canonical name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterKey {
    pub component: Component,
    pub kind: ParameterKind,
    pub name: String,
}

impl ParameterKey {
    pub fn new(component: Component, kind: ParameterKind, name: impl Into<String>) -> Self {
        Self {
            component,
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_parses_case_insensitively() {
        assert_eq!("TiKV".parse::<Component>().unwrap(), Component::TiKV);
        assert_eq!(" pd ".parse::<Component>().unwrap(), Component::PD);
        assert!("tiproxy".parse::<Component>().is_err());
    }

    #[test]
    fn component_serializes_lowercase() {
        let json = serde_json::to_string(&Component::TiFlash).unwrap();
        assert_eq!(json, "\"tiflash\"");
        let back: Component = serde_json::from_str("\"tidb\"").unwrap();
        assert_eq!(back, Component::TiDB);
    }
}
