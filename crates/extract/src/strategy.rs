use crate::error::{ExtractError, Result};
use crate::layout::SourceLayout;
use crate::language::SourceLanguage;
use async_trait::async_trait;
use precheck_model::{
    Component, DurationValue, ExtractionMethod, ForcedMutation, Value, Version, VersionSnapshot,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Defaults pulled out of one component checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDefaults {
    pub config: BTreeMap<String, Value>,
    pub system_variables: BTreeMap<String, Value>,
    pub bootstrap_version: Option<i64>,
    pub order_sensitive: BTreeSet<String>,
    pub method: ExtractionMethod,
}

impl ExtractedDefaults {
    pub fn new(method: ExtractionMethod) -> Self {
        Self {
            config: BTreeMap::new(),
            system_variables: BTreeMap::new(),
            bootstrap_version: None,
            order_sensitive: BTreeSet::new(),
            method,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.config.is_empty() && self.system_variables.is_empty()
    }

    /// Duration text becomes `Value::Duration`, whichever strategy read it.
    pub fn normalize_types(&mut self) {
        for values in [&mut self.config, &mut self.system_variables] {
            for value in values.values_mut() {
                if let Some(duration) = duration_text(value) {
                    *value = Value::Duration(duration);
                }
            }
        }
    }

    /// Record list parameters the layout declares order sensitive.
    pub fn mark_order_sensitive(&mut self, layout: &SourceLayout) {
        for name in &layout.order_sensitive {
            let is_list = self
                .config
                .get(name)
                .or_else(|| self.system_variables.get(name))
                .is_some_and(|v| matches!(v, Value::StringList(_)));
            if is_list {
                self.order_sensitive.insert(name.clone());
            }
        }
    }

    pub fn into_snapshot(self, component: Component, version: Version, now_ms: u64) -> VersionSnapshot {
        let mut snapshot = VersionSnapshot::new(component, version, self.method);
        snapshot.bootstrap_version = if component.is_primary() {
            self.bootstrap_version.unwrap_or(0)
        } else {
            0
        };
        snapshot.generated_at_unix_ms = now_ms;
        snapshot.config_defaults = self.config;
        snapshot.system_variables = self.system_variables;
        snapshot.order_sensitive = self.order_sensitive;
        snapshot
    }
}

/// A way of obtaining one component's defaults from a checked-out release.
#[async_trait]
pub trait DefaultsExtractor: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    async fn extract(&self, root: &Path, version: &Version) -> Result<ExtractedDefaults>;
}

/// Parses source files with tree-sitter.
#[derive(Debug, Clone)]
pub struct StaticExtractor {
    layout: SourceLayout,
}

impl StaticExtractor {
    pub fn new(layout: SourceLayout) -> Self {
        Self { layout }
    }

    pub fn for_component(component: Component) -> Self {
        Self::new(SourceLayout::for_component(component))
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }
}

#[async_trait]
impl DefaultsExtractor for StaticExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::SourceParse
    }

    async fn extract(&self, root: &Path, version: &Version) -> Result<ExtractedDefaults> {
        let layout = self.layout.clone();
        let root: PathBuf = root.to_path_buf();
        let component = layout.component;
        log::debug!("{component} {version}: static extraction in {}", root.display());
        // Parsing is CPU bound; keep it off the async workers.
        let mut extracted = tokio::task::spawn_blocking(move || match layout.language {
            SourceLanguage::Go => crate::go::extract_defaults(&layout, &root),
            SourceLanguage::Rust => crate::rust_source::extract_defaults(&layout, &root),
        })
        .await
        .map_err(|e| ExtractError::Other(format!("Extraction task failed: {e}")))??;
        if extracted.is_empty() {
            return Err(ExtractError::Empty(component));
        }
        extracted.normalize_types();
        extracted.mark_order_sensitive(&self.layout);
        Ok(extracted)
    }
}

/// Go `typeutil.Duration` and TiKV `ReadableDuration` print as text such as
/// `10ms` or `30m0s`; bare numbers stay numbers.
fn duration_text(value: &Value) -> Option<DurationValue> {
    match value {
        Value::String(text) if text.chars().any(|c| c.is_ascii_alphabetic()) => {
            DurationValue::parse(text).ok()
        }
        _ => None,
    }
}

/// Forced mutations declared by the bootstrap sources under `root`.
pub async fn extract_upgrade_logic(layout: &SourceLayout, root: &Path) -> Result<Vec<ForcedMutation>> {
    let layout = layout.clone();
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || crate::go::extract_upgrade_logic(&layout, &root))
        .await
        .map_err(|e| ExtractError::Other(format!("Upgrade logic task failed: {e}")))?
}

/// Bootstrap version only, for probes that do not report one.
pub async fn extract_bootstrap_version(layout: &SourceLayout, root: &Path) -> Result<Option<i64>> {
    let layout = layout.clone();
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || crate::go::extract_bootstrap_version(&layout, &root))
        .await
        .map_err(|e| ExtractError::Other(format!("Bootstrap task failed: {e}")))?
}
