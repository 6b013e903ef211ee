use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use precheck_analyzer::{RiskAnalyzer, UpgradePlan};
use precheck_builder::{
    aggregate_history, resolve_generate_concurrency, sources_from_config, BuilderConfig,
    ExtractionStrategy, GenerateOptions, Generator, RepositoryConfig, VersionBounds,
    VersionSelection,
};
use precheck_collector::{
    load_cluster_snapshot, save_cluster_snapshot, ClusterCollector, Endpoint, HttpConfigCollector,
    MysqlVariableSource, TidbCollector, VariableSource,
};
use precheck_model::{ClusterSnapshot, Component, FilterTable, HighRiskTable, Version};
use precheck_store::{paths, resolve_kb_dir, VersionStore};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const EXIT_REPOSITORY_UNAVAILABLE: i32 = 2;
const SQL_PASSWORD_ENV: &str = "UPGRADE_PRECHECK_SQL_PASSWORD";

#[derive(Parser)]
#[command(name = "upgrade-precheck")]
#[command(about = "Upgrade risk precheck for TiDB clusters", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Knowledge base directory (overrides UPGRADE_PRECHECK_KB_DIR)
    #[arg(long, global = true)]
    kb_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build knowledge base snapshots from component sources
    Generate(GenerateArgs),

    /// Fold stored snapshots into parameters_history.json
    #[command(name = "aggregate-history")]
    AggregateHistory(HistoryArgs),

    /// Collect runtime configuration from a live cluster
    Collect(CollectArgs),

    /// Compare a cluster against the knowledge base for an upgrade
    Precheck(PrecheckArgs),

    /// Print the generation ledger
    Ledger,

    /// Print the filter and high-risk tables the analyzer applies
    Filters(FiltersArgs),
}

#[derive(Args)]
struct FiltersArgs {
    /// Write the built-in filter table to filters.json unless one exists
    #[arg(long)]
    init: bool,
}

#[derive(Args)]
#[command(group = clap::ArgGroup::new("selection").args(["all", "version", "from"]))]
struct GenerateArgs {
    /// Configuration file (default: ./precheck.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Every release tag of the configured release lines
    #[arg(long)]
    all: bool,

    /// A single tag
    #[arg(long, value_parser = parse_version)]
    version: Option<Version>,

    /// Range start (inclusive), requires --to
    #[arg(long, value_parser = parse_version, requires = "to")]
    from: Option<Version>,

    /// Range end (inclusive)
    #[arg(long, value_parser = parse_version, requires = "from")]
    to: Option<Version>,

    /// Release line to scan with --all, e.g. v7.1 (repeatable)
    #[arg(long = "release-line")]
    release_lines: Vec<String>,

    /// Lower bound for --all and ranges
    #[arg(long, value_parser = parse_version)]
    start: Option<Version>,

    /// Upper bound for --all and ranges
    #[arg(long, value_parser = parse_version)]
    stop: Option<Version>,

    /// Leave versions already in the ledger untouched
    #[arg(long)]
    skip_existing: bool,

    /// Discard and regenerate existing snapshots
    #[arg(long, conflicts_with = "skip_existing")]
    force: bool,

    /// Parallel version tasks (overrides UPGRADE_PRECHECK_GENERATE_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Extraction strategy for every component
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Component repository as component=path (repeatable)
    #[arg(long = "repo", value_parser = parse_repo)]
    repos: Vec<(Component, PathBuf)>,

    /// Per-version task timeout in seconds
    #[arg(long)]
    task_timeout_secs: Option<u64>,

    /// Revision holding the full upgrade history
    #[arg(long)]
    upgrade_logic_ref: Option<String>,

    /// Skip upgrade logic extraction
    #[arg(long)]
    no_upgrade_logic: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Static,
    Probe,
}

impl From<StrategyArg> for ExtractionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Static => ExtractionStrategy::Static,
            StrategyArg::Probe => ExtractionStrategy::Probe,
        }
    }
}

#[derive(Args)]
struct HistoryArgs {
    /// Components to fold (default: all)
    #[arg(long = "component", value_parser = parse_component)]
    components: Vec<Component>,
}

#[derive(Args, Clone)]
struct EndpointArgs {
    /// PD client address (repeatable)
    #[arg(long = "pd")]
    pd: Vec<String>,

    /// TiKV status address (repeatable)
    #[arg(long = "tikv")]
    tikv: Vec<String>,

    /// TiFlash status address (repeatable)
    #[arg(long = "tiflash")]
    tiflash: Vec<String>,

    /// TiDB SQL address
    #[arg(long = "tidb")]
    tidb: Option<String>,

    /// TiDB status address (default: SQL port + 6080)
    #[arg(long = "tidb-status")]
    tidb_status: Vec<String>,

    /// SQL user for global variables
    #[arg(long, default_value = "root")]
    sql_user: String,

    /// Per-component timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

impl EndpointArgs {
    fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut endpoints = Vec::new();
        for (component, addresses) in [
            (Component::PD, &self.pd),
            (Component::TiKV, &self.tikv),
            (Component::TiFlash, &self.tiflash),
        ] {
            if !addresses.is_empty() {
                endpoints.push(Endpoint::new(component, addresses.iter().cloned()));
            }
        }
        if self.tidb.is_some() || !self.tidb_status.is_empty() {
            endpoints.push(Endpoint::tidb(self.tidb.clone(), self.tidb_status.clone())?);
        }
        Ok(endpoints)
    }

    fn is_empty(&self) -> bool {
        self.pd.is_empty()
            && self.tikv.is_empty()
            && self.tiflash.is_empty()
            && self.tidb.is_none()
            && self.tidb_status.is_empty()
    }

    fn collector(&self) -> Result<ClusterCollector> {
        let timeout = Duration::from_secs(self.timeout_secs.max(1));
        let password = std::env::var(SQL_PASSWORD_ENV).ok().filter(|p| !p.is_empty());
        let variables: Arc<dyn VariableSource> =
            Arc::new(MysqlVariableSource::new(&self.sql_user, password, timeout));
        Ok(ClusterCollector::empty(timeout)
            .with_collector(Arc::new(HttpConfigCollector::pd(timeout)?))
            .with_collector(Arc::new(HttpConfigCollector::tikv(timeout)?))
            .with_collector(Arc::new(HttpConfigCollector::tiflash(timeout)?))
            .with_collector(Arc::new(TidbCollector::new(timeout, Some(variables))?)))
    }
}

#[derive(Args)]
struct CollectArgs {
    #[command(flatten)]
    endpoints: EndpointArgs,

    /// Write the snapshot here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct PrecheckArgs {
    /// Version the cluster runs now
    #[arg(long, value_parser = parse_version)]
    current: Version,

    /// Version to upgrade to
    #[arg(long, value_parser = parse_version)]
    target: Version,

    /// Saved cluster snapshot from `collect`
    #[arg(long, conflicts_with_all = ["pd", "tikv", "tiflash", "tidb", "tidb_status"])]
    snapshot: Option<PathBuf>,

    #[command(flatten)]
    endpoints: EndpointArgs,

    /// Components to analyze (default: all)
    #[arg(long = "component", value_parser = parse_component)]
    components: Vec<Component>,

    /// Write the report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn parse_version(raw: &str) -> std::result::Result<Version, String> {
    Version::parse(raw).map_err(|e| e.to_string())
}

fn parse_component(raw: &str) -> std::result::Result<Component, String> {
    raw.parse::<Component>().map_err(|e| e.to_string())
}

fn parse_repo(raw: &str) -> std::result::Result<(Component, PathBuf), String> {
    let (component, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected component=path, got `{raw}`"))?;
    Ok((parse_component(component)?, PathBuf::from(path)))
}

fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{text}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
            Ok(())
        }
        None => print_stdout(&text),
    }
}

fn components_or_all(components: &[Component]) -> Vec<Component> {
    if components.is_empty() {
        Component::ALL.to_vec()
    } else {
        components.to_vec()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Generate(args) => run_generate(args, cli.kb_dir.as_deref()).await,
        Commands::AggregateHistory(args) => run_history(args, cli.kb_dir.as_deref()).await,
        Commands::Collect(args) => run_collect(args, cli.kb_dir.as_deref()).await,
        Commands::Precheck(args) => run_precheck(args, cli.kb_dir.as_deref()).await,
        Commands::Ledger => run_ledger(cli.kb_dir.as_deref()).await,
        Commands::Filters(args) => run_filters(args, cli.kb_dir.as_deref()).await,
    }
}

async fn open_store(explicit: Option<&Path>) -> Result<VersionStore> {
    let dir = resolve_kb_dir(explicit);
    VersionStore::open(&dir)
        .await
        .with_context(|| format!("Failed to open knowledge base at {}", dir.display()))
}

async fn run_generate(args: GenerateArgs, kb_dir: Option<&Path>) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BuilderConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => BuilderConfig::load_default().context("Failed to load precheck.toml")?,
    };
    for (component, path) in &args.repos {
        let repo = config
            .repositories
            .entry(*component)
            .or_insert_with(|| RepositoryConfig {
                path: path.clone(),
                layout: Default::default(),
                strategy: Default::default(),
                probe_command: None,
                probe_timeout_secs: 120,
            });
        repo.path = path.clone();
    }
    if !args.release_lines.is_empty() {
        config.release_lines = args.release_lines.clone();
    }

    let store = open_store(kb_dir.or(config.kb_dir.as_deref())).await?;
    let concurrency = resolve_generate_concurrency(args.concurrency.or(config.concurrency));
    let worktree_dir = config
        .worktree_dir
        .clone()
        .unwrap_or_else(|| store.root().join(".worktrees"));
    let sources = sources_from_config(
        &config,
        &worktree_dir,
        concurrency,
        args.strategy.map(Into::into),
    )?;

    let selection = match (&args.version, &args.from, &args.to) {
        (Some(version), _, _) => VersionSelection::Single(version.clone()),
        (None, Some(from), Some(to)) => VersionSelection::Range {
            from: from.clone(),
            to: to.clone(),
        },
        _ => {
            if !args.all {
                log::debug!("No selection given; scanning configured release lines");
            }
            VersionSelection::Auto {
                release_lines: config.release_lines.clone(),
            }
        }
    };
    let bounds = VersionBounds {
        start: args.start.clone().or_else(|| config.start_bound()),
        stop: args.stop.clone().or_else(|| config.stop_bound()),
    };
    let options = GenerateOptions {
        concurrency,
        task_timeout: args
            .task_timeout_secs
            .map(|s| Duration::from_secs(s.max(1)))
            .unwrap_or_else(|| config.task_timeout()),
        skip_existing: args.skip_existing,
        force: args.force,
        upgrade_logic_ref: if args.no_upgrade_logic {
            None
        } else {
            Some(
                args.upgrade_logic_ref
                    .clone()
                    .unwrap_or_else(|| config.upgrade_logic_ref.clone()),
            )
        },
    };

    let generator = Generator::new(store, sources, options);
    let report = match generator.run(&selection, &bounds).await {
        Ok(report) => report,
        Err(err) if err.is_fatal() => {
            log::error!("{err}");
            std::process::exit(EXIT_REPOSITORY_UNAVAILABLE);
        }
        Err(err) => return Err(err).context("Generation failed"),
    };
    emit_json(&report, None)?;
    let code = report.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn run_history(args: HistoryArgs, kb_dir: Option<&Path>) -> Result<()> {
    let store = open_store(kb_dir).await?;
    let components = components_or_all(&args.components);
    let (document, path) = aggregate_history(&store, &components)
        .await
        .context("Failed to aggregate history")?;

    #[derive(Serialize)]
    struct ComponentSummary {
        versions: usize,
        config: usize,
        system_variables: usize,
    }
    #[derive(Serialize)]
    struct HistoryOutput {
        path: PathBuf,
        components: std::collections::BTreeMap<Component, ComponentSummary>,
    }
    let output = HistoryOutput {
        path,
        components: document
            .components
            .iter()
            .map(|(c, h)| {
                (
                    *c,
                    ComponentSummary {
                        versions: h.versions.len(),
                        config: h.config.len(),
                        system_variables: h.system_variables.len(),
                    },
                )
            })
            .collect(),
    };
    emit_json(&output, None)
}

/// Cluster collector using the knowledge base's rename table when one exists.
async fn cluster_collector(endpoints: &EndpointArgs, kb_dir: Option<&Path>) -> Result<ClusterCollector> {
    let store = VersionStore::at(resolve_kb_dir(kb_dir));
    let renames = store.rename_table().await.unwrap_or_else(|err| {
        log::warn!("Ignoring unreadable rename table: {err}");
        Default::default()
    });
    Ok(endpoints.collector()?.with_renames(renames))
}

async fn run_collect(args: CollectArgs, kb_dir: Option<&Path>) -> Result<()> {
    if args.endpoints.is_empty() {
        anyhow::bail!("No endpoints given; pass --pd, --tikv, --tiflash or --tidb");
    }
    let collector = cluster_collector(&args.endpoints, kb_dir).await?;
    let cluster = collector.collect(&args.endpoints.endpoints()?).await;
    match &args.output {
        Some(path) => save_cluster_snapshot(path, &cluster)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => emit_json(&cluster, None),
    }
}

async fn run_precheck(args: PrecheckArgs, kb_dir: Option<&Path>) -> Result<()> {
    let store = open_store(kb_dir).await?;
    let cluster: ClusterSnapshot = match &args.snapshot {
        Some(path) => load_cluster_snapshot(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None if args.endpoints.is_empty() => {
            log::warn!("No snapshot or endpoints given; every forced change will be unverifiable");
            ClusterSnapshot::default()
        }
        None => {
            let collector = cluster_collector(&args.endpoints, kb_dir).await?;
            collector.collect(&args.endpoints.endpoints()?).await
        }
    };

    let components = components_or_all(&args.components);
    let plan = UpgradePlan::load(&store, &components, &args.current, &args.target)
        .await
        .context("Failed to load upgrade plan")?;
    let report = RiskAnalyzer::new().analyze(&plan, &cluster);
    log::info!(
        "{} -> {}: {} P0, {} P1, {} P2, {} filtered",
        report.current,
        report.target,
        report.summary.p0,
        report.summary.p1,
        report.summary.p2,
        report.summary.filtered
    );
    emit_json(&report, args.output.as_deref())
}

async fn run_ledger(kb_dir: Option<&Path>) -> Result<()> {
    let store = open_store(kb_dir).await?;
    let ledger = store.load_ledger().await.context("Failed to read ledger")?;
    emit_json(&ledger, None)
}

#[derive(Serialize)]
struct ParameterPolicy {
    filters: FilterTable,
    high_risk: HighRiskTable,
}

async fn run_filters(args: FiltersArgs, kb_dir: Option<&Path>) -> Result<()> {
    let store = open_store(kb_dir).await?;
    if args.init {
        let path = paths::filters_path(store.root());
        if path.exists() {
            log::info!("{} already exists, left untouched", path.display());
        } else {
            let _lock = store.lock().await.context("Failed to lock knowledge base")?;
            store
                .save_filter_table(&FilterTable::builtin())
                .await
                .context("Failed to write filter table")?;
            log::info!("Wrote {}", path.display());
        }
    }
    let policy = ParameterPolicy {
        filters: store.filter_table().await.context("Failed to read filter table")?,
        high_risk: store.high_risk_table().await.context("Failed to read high-risk table")?,
    };
    emit_json(&policy, None)
}
