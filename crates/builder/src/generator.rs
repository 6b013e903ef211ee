use crate::config::{BuilderConfig, ExtractionStrategy, RepositoryLayout};
use crate::error::{BuildError, Result};
use crate::report::{GenerationReport, TaskOutcome, TaskStatus, UpgradeLogicOutcome};
use crate::source::{DirectorySourceTree, GitSourceTree, SourceTree};
use crate::targets::{parse_tags, resolve_targets, VersionBounds, VersionSelection};
use precheck_extract::{
    extract_upgrade_logic, DefaultsExtractor, ProbeExtractor, SourceLayout, StaticExtractor,
};
use precheck_model::{current_unix_ms, Component, Version};
use precheck_store::{StoreError, VersionStore, WriteMode};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A component's sources paired with the strategy that reads them.
#[derive(Clone)]
pub struct ComponentSource {
    pub tree: Arc<dyn SourceTree>,
    pub extractor: Arc<dyn DefaultsExtractor>,
}

impl ComponentSource {
    pub fn new(tree: Arc<dyn SourceTree>, extractor: Arc<dyn DefaultsExtractor>) -> Self {
        Self { tree, extractor }
    }

    pub fn component(&self) -> Component {
        self.tree.component()
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub concurrency: usize,
    pub task_timeout: Duration,
    pub skip_existing: bool,
    pub force: bool,
    /// Revision of the primary component holding the upgrade history; `None` skips that step.
    pub upgrade_logic_ref: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            task_timeout: Duration::from_secs(900),
            skip_existing: false,
            force: false,
            upgrade_logic_ref: Some("master".into()),
        }
    }
}

/// Build component sources from configuration; `strategy` overrides every repository's own.
pub fn sources_from_config(
    config: &BuilderConfig,
    worktree_dir: &Path,
    pool_size: usize,
    strategy: Option<ExtractionStrategy>,
) -> Result<Vec<ComponentSource>> {
    let mut sources = Vec::with_capacity(config.repositories.len());
    for (&component, repo) in &config.repositories {
        let tree: Arc<dyn SourceTree> = match repo.layout {
            RepositoryLayout::Git => Arc::new(GitSourceTree::new(component, &repo.path, worktree_dir, pool_size)),
            RepositoryLayout::Directories => Arc::new(DirectorySourceTree::new(component, &repo.path)),
        };
        let extractor: Arc<dyn DefaultsExtractor> = match strategy.unwrap_or(repo.strategy) {
            ExtractionStrategy::Static => Arc::new(StaticExtractor::for_component(component)),
            ExtractionStrategy::Probe => {
                let command = repo.probe_command.clone().ok_or_else(|| {
                    BuildError::Config(format!("repositories.{component}: probe strategy needs probe_command"))
                })?;
                Arc::new(
                    ProbeExtractor::new(component, command)
                        .with_timeout(Duration::from_secs(repo.probe_timeout_secs.max(1))),
                )
            }
        };
        sources.push(ComponentSource::new(tree, extractor));
    }
    Ok(sources)
}

/// Drives one knowledge base generation run.
pub struct Generator {
    store: VersionStore,
    sources: Vec<ComponentSource>,
    options: GenerateOptions,
}

struct TaskResult {
    outcome: TaskOutcome,
    commit: Option<String>,
}

impl Generator {
    pub fn new(store: VersionStore, sources: Vec<ComponentSource>, options: GenerateOptions) -> Self {
        Self {
            store,
            sources,
            options,
        }
    }

    async fn usable_sources(&self) -> Result<Vec<ComponentSource>> {
        let mut usable = Vec::new();
        for source in &self.sources {
            if source.tree.is_available().await {
                usable.push(source.clone());
            } else {
                log::warn!("{} source is not available; skipping component", source.component());
            }
        }
        if usable.is_empty() {
            return Err(BuildError::RepositoryUnavailable(if self.sources.is_empty() {
                "no component repositories configured".into()
            } else {
                "none of the configured repositories exist or are git repositories".into()
            }));
        }
        Ok(usable)
    }

    /// Resolve targets, build the upgrade logic, then generate every (version, component).
    ///
    /// Only an unusable source set is fatal; everything else ends up in the report.
    pub async fn run(&self, selection: &VersionSelection, bounds: &VersionBounds) -> Result<GenerationReport> {
        let sources = self.usable_sources().await?;
        let _lock = self.store.lock().await?;

        let mut tags: BTreeMap<Component, BTreeMap<Version, String>> = BTreeMap::new();
        for source in &sources {
            let listed = match source.tree.list_tags().await {
                Ok(listed) => listed,
                Err(err) => {
                    log::warn!("Failed to list {} tags: {err}", source.component());
                    Vec::new()
                }
            };
            tags.insert(source.component(), parse_tags(&listed));
        }
        let available: BTreeSet<Version> = tags.values().flat_map(|t| t.keys().cloned()).collect();
        let targets = resolve_targets(&available, selection, bounds)?;
        log::info!(
            "Generating {} version(s) for {} component(s) with concurrency {}",
            targets.len(),
            sources.len(),
            self.options.concurrency
        );

        let upgrade_logic = self.generate_upgrade_logic(&sources).await;
        let results = self.generate_versions(&sources, &tags, &targets).await?;

        let mut ledger = self.store.load_ledger().await?;
        let now = current_unix_ms();
        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            match &result.outcome.status {
                TaskStatus::Generated { digest, .. } => ledger.mark_generated(
                    &result.outcome.version,
                    result.outcome.component,
                    result.commit.clone(),
                    Some(digest.clone()),
                    now,
                ),
                // Force discarded the old artifact before this attempt.
                TaskStatus::Failed { .. } if self.options.force => {
                    ledger.forget(&result.outcome.version, result.outcome.component);
                }
                _ => {}
            }
            outcomes.push(result.outcome);
        }
        ledger.last_run_at_unix_ms = now;
        self.store.save_ledger(&ledger).await?;

        for source in &sources {
            source.tree.cleanup().await;
        }

        let report = GenerationReport::new(targets, upgrade_logic, outcomes);
        log::info!(
            "Generation finished: {} generated, {} skipped, {} conflicts, {} failed",
            report.summary.generated,
            report.summary.skipped,
            report.summary.conflicts,
            report.summary.failed
        );
        Ok(report)
    }

    /// Single serialized step before any version task starts; failure is recorded, not raised.
    async fn generate_upgrade_logic(&self, sources: &[ComponentSource]) -> UpgradeLogicOutcome {
        let Some(rev) = self.options.upgrade_logic_ref.as_deref() else {
            return UpgradeLogicOutcome::NotConfigured;
        };
        let Some(primary) = sources.iter().find(|s| s.component().is_primary()) else {
            return UpgradeLogicOutcome::NotConfigured;
        };
        let component = primary.component();
        let result: Result<UpgradeLogicOutcome> = async {
            let checkout = primary.tree.checkout(rev).await?;
            let layout = SourceLayout::for_component(component);
            let mutations = extract_upgrade_logic(&layout, checkout.root())
                .await
                .map_err(|e| BuildError::Other(format!("upgrade logic at {rev}: {e}")))?;
            drop(checkout);
            let appended = self.store.put_upgrade_logic(mutations).await?;
            Ok(UpgradeLogicOutcome::Appended {
                added: appended.added,
                total: appended.total,
            })
        }
        .await;
        match result {
            Ok(outcome) => {
                if let UpgradeLogicOutcome::Appended { added, total } = &outcome {
                    log::info!("Upgrade logic: {added} new mutation(s), {total} total");
                }
                outcome
            }
            Err(err) => {
                log::warn!("Upgrade logic extraction failed: {err}");
                UpgradeLogicOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn generate_versions(
        &self,
        sources: &[ComponentSource],
        tags: &BTreeMap<Component, BTreeMap<Version, String>>,
        targets: &[Version],
    ) -> Result<Vec<TaskResult>> {
        let ledger = self.store.load_ledger().await?;
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut join = JoinSet::new();
        let mut results = Vec::new();

        for version in targets {
            for source in sources {
                let component = source.component();
                let skip = self.options.skip_existing
                    && !self.options.force
                    && ledger.is_generated_for(version, component)
                    && self.store.exists(version, component).await;
                if skip {
                    log::info!("{component} {version}: already generated, skipping");
                    results.push(TaskResult {
                        outcome: TaskOutcome {
                            version: version.clone(),
                            component,
                            status: TaskStatus::Skipped,
                        },
                        commit: None,
                    });
                    continue;
                }
                if self.options.force && self.store.delete(version, component).await? {
                    log::info!("{component} {version}: discarded previous snapshot");
                }

                let tag = tags
                    .get(&component)
                    .and_then(|t| t.get(version))
                    .cloned()
                    .unwrap_or_else(|| version.tag());
                let task = VersionTask {
                    source: source.clone(),
                    store: self.store.clone(),
                    version: version.clone(),
                    tag,
                    force: self.options.force,
                };
                let semaphore = semaphore.clone();
                let timeout = self.options.task_timeout;
                join.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    task.run_isolated(timeout).await
                });
            }
        }

        while let Some(joined) = join.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                // run_isolated catches panics of the work itself.
                Err(err) => log::warn!("Generation task aborted: {err}"),
            }
        }
        Ok(results)
    }
}

struct VersionTask {
    source: ComponentSource,
    store: VersionStore,
    version: Version,
    tag: String,
    force: bool,
}

impl VersionTask {
    /// Run in its own task so a panic or timeout only affects this pair.
    async fn run_isolated(self, limit: Duration) -> TaskResult {
        let version = self.version.clone();
        let component = self.source.component();
        let mut handle = tokio::spawn(self.run());
        let status_and_commit = match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(Ok(done))) => Ok(done),
            Ok(Ok(Err(err))) => Err(err.to_string()),
            Ok(Err(join_err)) => Err(format!("task panicked: {join_err}")),
            Err(_) => {
                handle.abort();
                Err(BuildError::Timeout {
                    version: version.clone(),
                    component,
                    after: limit,
                }
                .to_string())
            }
        };
        let (status, commit) = match status_and_commit {
            Ok((status, commit)) => {
                match &status {
                    TaskStatus::Generated { parameters, .. } => {
                        log::info!("{component} {version}: generated {parameters} parameters")
                    }
                    TaskStatus::Conflict => {
                        log::info!("{component} {version}: snapshot exists, left untouched")
                    }
                    _ => {}
                }
                (status, commit)
            }
            Err(reason) => {
                log::warn!("{component} {version}: {reason}");
                (TaskStatus::Failed { reason }, None)
            }
        };
        TaskResult {
            outcome: TaskOutcome {
                version,
                component,
                status,
            },
            commit,
        }
    }

    async fn run(self) -> Result<(TaskStatus, Option<String>)> {
        let component = self.source.component();
        let mode = if self.force {
            WriteMode::Force
        } else {
            WriteMode::Create
        };
        if mode == WriteMode::Create && self.store.exists(&self.version, component).await {
            return Ok((TaskStatus::Conflict, None));
        }

        let checkout = self.source.tree.checkout(&self.tag).await?;
        let extracted = self
            .source
            .extractor
            .extract(checkout.root(), &self.version)
            .await
            .map_err(|source| BuildError::Extraction {
                version: self.version.clone(),
                component,
                source,
            })?;
        let commit = checkout.commit().map(str::to_string);
        drop(checkout);

        let snapshot = extracted.into_snapshot(component, self.version.clone(), current_unix_ms());
        let parameters = snapshot.parameter_count();
        match self.store.put(&snapshot, mode).await {
            Ok(put) => Ok((
                TaskStatus::Generated {
                    digest: put.digest,
                    parameters,
                },
                commit,
            )),
            Err(StoreError::Conflict { .. }) => Ok((TaskStatus::Conflict, None)),
            Err(err) => Err(err.into()),
        }
    }
}
