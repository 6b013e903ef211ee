//! Static extraction from Go sources (TiDB, PD).

pub mod config;
pub mod expr;
pub mod index;
pub mod upgrade;

use crate::error::{ExtractError, Result};
use crate::language::{ParsedFile, SourceLanguage};
use crate::layout::SourceLayout;
use crate::strategy::ExtractedDefaults;
use precheck_model::{ExtractionMethod, ForcedMutation};
use std::path::{Path, PathBuf};

pub use expr::{GoExpr, GoScope};
pub use index::GoIndex;

fn parse_all(paths: &[PathBuf]) -> Result<Vec<ParsedFile>> {
    let mut parser = SourceLanguage::Go.parser()?;
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match ParsedFile::read(&mut parser, path) {
            Ok(file) => files.push(file),
            Err(ExtractError::IoError(err)) => {
                log::debug!("Skipping unreadable {}: {err}", path.display());
            }
            Err(err) => return Err(err),
        }
    }
    Ok(files)
}

/// Parse a component's Go sources and fold out defaults and the bootstrap version.
pub fn extract_defaults(layout: &SourceLayout, root: &Path) -> Result<ExtractedDefaults> {
    let config_paths = layout.resolve_config_files(root);
    let sysvar_paths = layout.resolve_sysvar_files(root);
    if config_paths.is_empty() && sysvar_paths.is_empty() {
        return Err(ExtractError::MissingSource {
            component: layout.component,
            what: "configuration",
            root: root.to_path_buf(),
        });
    }

    let mut index = GoIndex::new();
    for file in parse_all(&config_paths)? {
        index.add_file(&file);
    }
    for file in parse_all(&sysvar_paths)? {
        index.add_constants(&file);
        index.add_sysvars(&file);
    }
    for file in parse_all(&layout.resolve_constant_files(root))? {
        index.add_constants(&file);
    }
    let bootstrap_files = parse_all(&layout.resolve_bootstrap_files(root))?;
    for file in &bootstrap_files {
        index.add_constants(file);
    }

    let mut extracted = ExtractedDefaults::new(ExtractionMethod::SourceParse);
    for root_type in &layout.root_config_types {
        if index.structs.contains_key(root_type) {
            extracted.config = config::flatten_config(&index, root_type);
            break;
        }
    }
    extracted.system_variables = config::extract_sysvars(&index);
    if !bootstrap_files.is_empty() {
        extracted.bootstrap_version = config::bootstrap_version(&index);
    }
    log::debug!(
        "{}: {} config defaults, {} system variables from {} structs",
        layout.component,
        extracted.config.len(),
        extracted.system_variables.len(),
        index.structs.len()
    );
    Ok(extracted)
}

/// `currentBootstrapVersion` of a checkout, `None` when it has no bootstrap sources.
pub fn extract_bootstrap_version(layout: &SourceLayout, root: &Path) -> Result<Option<i64>> {
    let bootstrap_files = parse_all(&layout.resolve_bootstrap_files(root))?;
    if bootstrap_files.is_empty() {
        return Ok(None);
    }
    let mut index = GoIndex::new();
    for file in &bootstrap_files {
        index.add_constants(file);
    }
    Ok(config::bootstrap_version(&index))
}

/// Forced mutations from the bootstrap sources of a (trunk) TiDB checkout.
pub fn extract_upgrade_logic(layout: &SourceLayout, root: &Path) -> Result<Vec<ForcedMutation>> {
    let bootstrap_paths = layout.resolve_bootstrap_files(root);
    if bootstrap_paths.is_empty() {
        return Err(ExtractError::MissingSource {
            component: layout.component,
            what: "bootstrap",
            root: root.to_path_buf(),
        });
    }
    let mut index = GoIndex::new();
    let mut constant_paths = layout.resolve_constant_files(root);
    constant_paths.extend(layout.resolve_sysvar_files(root));
    for file in parse_all(&constant_paths)? {
        index.add_constants(&file);
    }
    let bootstrap_files = parse_all(&bootstrap_paths)?;
    for file in &bootstrap_files {
        index.add_constants(file);
    }
    Ok(upgrade::collect_upgrade_mutations(&bootstrap_files, &index.scope))
}
