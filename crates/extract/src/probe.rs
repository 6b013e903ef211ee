use crate::error::{ExtractError, Result};
use crate::layout::SourceLayout;
use crate::strategy::{extract_bootstrap_version, DefaultsExtractor, ExtractedDefaults};
use async_trait::async_trait;
use precheck_model::{flatten_json, Component, ExtractionMethod, Value, ValueType, Version};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(120);
const STDERR_TAIL: usize = 512;

/// JSON a probe command prints on stdout.
#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    config: serde_json::Value,
    #[serde(default, alias = "system_variables")]
    sysvars: serde_json::Value,
    #[serde(default)]
    bootstrap_version: Option<i64>,
}

/// Runs a built binary (or any command) that reports its own defaults.
///
/// The command goes through `sh -c` with `{root}` and `{version}` replaced by
/// the worktree path and the release tag.
#[derive(Debug, Clone)]
pub struct ProbeExtractor {
    component: Component,
    command: String,
    timeout: Duration,
    layout: SourceLayout,
}

impl ProbeExtractor {
    pub fn new(component: Component, command: impl Into<String>) -> Self {
        Self {
            component,
            command: command.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            layout: SourceLayout::for_component(component),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn render_command(&self, root: &Path, version: &Version) -> String {
        self.command
            .replace("{root}", &root.display().to_string())
            .replace("{version}", &version.tag())
    }

    async fn run(&self, root: &Path, version: &Version) -> Result<Vec<u8>> {
        let command = self.render_command(root, version);
        log::debug!("{} {version}: probe `{command}`", self.component);
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(root)
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout, child)
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout))??;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(STDERR_TAIL)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Err(ExtractError::probe(format!(
                "`{command}` exited with {}: {}",
                output.status,
                tail.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl DefaultsExtractor for ProbeExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::BinaryProbe
    }

    async fn extract(&self, root: &Path, version: &Version) -> Result<ExtractedDefaults> {
        let stdout = self.run(root, version).await?;
        let mut extracted = parse_probe_output(&stdout)?;
        extracted.mark_order_sensitive(&self.layout);
        if extracted.is_empty() {
            return Err(ExtractError::Empty(self.component));
        }
        if self.component.is_primary() && extracted.bootstrap_version.is_none() {
            extracted.bootstrap_version = extract_bootstrap_version(&self.layout, root).await?;
        }
        Ok(extracted)
    }
}

/// Decode probe output. Leaves shaped `{"type": .., "value": ..}` keep their
/// declared type; everything else is inferred.
pub fn parse_probe_output(stdout: &[u8]) -> Result<ExtractedDefaults> {
    let output: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ExtractError::probe(format!("Probe output is not valid JSON: {e}")))?;
    let mut extracted = ExtractedDefaults::new(ExtractionMethod::BinaryProbe);
    extracted.config = decode_section(&output.config);
    extracted.system_variables = decode_section(&output.sysvars)
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    extracted.bootstrap_version = output.bootstrap_version;
    extracted.normalize_types();
    Ok(extracted)
}

fn decode_section(section: &serde_json::Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let mut plain = serde_json::Map::new();
    if let Some(object) = section.as_object() {
        for (name, leaf) in object {
            match typed_leaf(leaf) {
                Some(value) => {
                    out.insert(name.clone(), value);
                }
                None => {
                    plain.insert(name.clone(), leaf.clone());
                }
            }
        }
    }
    out.extend(flatten_json(&serde_json::Value::Object(plain)));
    out
}

fn typed_leaf(leaf: &serde_json::Value) -> Option<Value> {
    let object = leaf.as_object()?;
    if object.len() != 2 {
        return None;
    }
    let value_type: ValueType = serde_json::from_value(object.get("type")?.clone()).ok()?;
    Value::from_json(object.get("value")?)?.coerce_to(value_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use precheck_model::DurationValue;

    #[test]
    fn typed_and_inferred_leaves() {
        let raw = br#"{
            "config": {
                "log": {"level": "info", "file": {"max-size": 300}},
                "performance.max-txn-ttl": {"type": "duration", "value": "1h"}
            },
            "sysvars": {"TiDB_Enable_Async_Commit": {"type": "bool", "value": "ON"}},
            "bootstrap_version": 180
        }"#;
        let extracted = parse_probe_output(raw).unwrap();
        assert_eq!(extracted.bootstrap_version, Some(180));
        assert_eq!(extracted.config["log.level"], Value::String("info".into()));
        assert_eq!(extracted.config["log.file.max-size"], Value::Int(300));
        assert_eq!(
            extracted.config["performance.max-txn-ttl"],
            Value::Duration(DurationValue::from_hours(1))
        );
        assert_eq!(
            extracted.system_variables["tidb_enable_async_commit"],
            Value::Bool(true)
        );
    }

    #[test]
    fn untyped_duration_text_is_typed() {
        let extracted = parse_probe_output(
            br#"{"config": {"schedule": {"patrol-region-interval": "10ms", "split-merge-interval": "1h0m0s", "store-limit-version": "v1"}}}"#,
        )
        .unwrap();
        assert_eq!(
            extracted.config["schedule.patrol-region-interval"],
            Value::Duration(DurationValue::from_millis(10))
        );
        assert_eq!(
            extracted.config["schedule.split-merge-interval"],
            Value::Duration(DurationValue::from_hours(1))
        );
        assert_eq!(extracted.config["schedule.store-limit-version"], Value::string("v1"));
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            parse_probe_output(b"tidb-server v7.1.0"),
            Err(ExtractError::Probe(_))
        ));
    }
}
