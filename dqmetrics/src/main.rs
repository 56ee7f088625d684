//! Data quality metrics calculator.
//!
//! This tool scores the resources of tabular datasets along six data quality
//! dimensions, aggregates the scores per dataset and stores them in a SQLite
//! database. Stored scores can be inspected and manually overridden.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use dqmetrics_core::logging::init_logging;
use dqmetrics_core::report::{
    package_data_quality, reset_manual, resource_data_quality, set_manual_metrics,
};
use dqmetrics_core::{
    DataQualityMetrics, DatasetCatalog, Dimension, DirectoryCatalog, EngineConfig, EntityType,
    HttpDownloader, LocalFileProvider, MetricsStore, SqliteMetricsStore,
};
use serde_json::Value;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dqmetrics")]
#[command(about = "Data quality metrics calculator for tabular datasets")]
#[command(version)]
#[command(long_about = "
dqmetrics - data quality scoring for tabular datasets

Scores every resource of a dataset and the dataset as a whole along six
dimensions: completeness, uniqueness, timeliness, validity, accuracy and
consistency. Results are cached per resource and only recalculated when the
resource changes. Manually set metrics are never recalculated.

Per-resource settings are read from the resource descriptor:
  dq_timeliness_column, dq_timeliness_date_format, dq_accuracy_column

EXAMPLES:
  dqmetrics --catalog ./catalog calculate --dataset population
  dqmetrics --catalog ./catalog calculate --dataset all --dimension completeness,validity
  dqmetrics show --dataset population
  dqmetrics set-manual --entity package --id population --file overrides.json
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Engine configuration file
    #[arg(long, global = true, env = "DQ_CONFIG", help = "JSON engine configuration file")]
    pub config: Option<PathBuf>,

    /// Directory of dataset descriptors
    #[arg(
        long,
        global = true,
        env = "DQ_CATALOG",
        default_value = "catalog",
        help = "Directory holding one <dataset_id>.json descriptor per dataset"
    )]
    pub catalog: PathBuf,

    /// Metrics database
    #[arg(
        long,
        global = true,
        env = "DQ_DATABASE",
        default_value = "sqlite://dqmetrics.db",
        help = "SQLite database holding the calculated metrics"
    )]
    pub database: String,

    /// Uploads root
    #[arg(long, global = true, env = "DQ_STORAGE_PATH", help = "Root directory of uploaded resource files")]
    pub storage_path: Option<PathBuf>,

    /// Rows per page
    #[arg(long, global = true, env = "DQ_PAGE_SIZE", help = "Rows fetched per page")]
    pub page_size: Option<usize>,

    /// API key for downloading uploads not in local storage
    #[arg(
        long,
        global = true,
        env = "DQ_API_KEY",
        hide_env_values = true,
        help = "API key sent as the Authorization header when downloading uploads"
    )]
    pub api_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Calculate metrics of one or all datasets
    Calculate(CalculateArgs),
    /// Show stored metrics of a dataset or resource
    Show(ShowArgs),
    /// Store manual metrics for a dataset or resource
    SetManual(SetManualArgs),
    /// Remove a manual metric so it is recalculated
    ResetManual(ResetManualArgs),
    /// Delete the stored metrics of a dataset or resource
    Delete(EntityArgs),
}

#[derive(Args)]
pub struct CalculateArgs {
    /// Dataset id, or `all`
    #[arg(long, default_value = "all", help = "Dataset id, or 'all' for every dataset")]
    pub dataset: String,

    /// Dimensions to calculate
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "all",
        help = "Comma-separated dimensions, or 'all'"
    )]
    pub dimension: Vec<String>,

    /// Ignore cached results
    #[arg(long, help = "Recalculate every non-manual metric, ignoring the cache")]
    pub force: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct ShowArgs {
    /// Dataset id
    #[arg(long, help = "Show dataset-level metrics")]
    pub dataset: Option<String>,

    /// Resource id
    #[arg(long, help = "Show resource-level metrics")]
    pub resource: Option<String>,
}

#[derive(Args)]
pub struct EntityArgs {
    /// Entity type
    #[arg(long, help = "Entity type: resource or package (dataset)")]
    pub entity: String,

    /// Entity id
    #[arg(long, help = "Resource or dataset id")]
    pub id: String,
}

#[derive(Args)]
pub struct SetManualArgs {
    #[command(flatten)]
    pub entity: EntityArgs,

    /// Overrides file
    #[arg(long, help = "JSON file mapping dimension names to metric details")]
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ResetManualArgs {
    #[command(flatten)]
    pub entity: EntityArgs,

    /// Dimension to reset
    #[arg(long, help = "Dimension whose manual metric is removed")]
    pub dimension: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let store = SqliteMetricsStore::connect(&cli.global.database)
        .await
        .with_context(|| format!("opening metrics database {}", cli.global.database))?;
    let store: Arc<dyn MetricsStore> = Arc::new(store);

    match &cli.command {
        Command::Calculate(args) => calculate(&cli.global, args, store).await,
        Command::Show(args) => show(args, store.as_ref()).await,
        Command::SetManual(args) => {
            let entity_type: EntityType = args.entity.entity.parse()?;
            let overrides = read_overrides(&args.file)?;
            let record =
                set_manual_metrics(store.as_ref(), entity_type, &args.entity.id, &overrides)
                    .await?;
            println!("Stored {} manual metric(s) for {} {}", overrides.len(), record.entity_type, record.ref_id);
            Ok(())
        }
        Command::ResetManual(args) => {
            let entity_type: EntityType = args.entity.entity.parse()?;
            let dimension: Dimension = args.dimension.parse()?;
            if reset_manual(store.as_ref(), entity_type, &args.entity.id, dimension).await? {
                println!("Manual {} removed from {} {}", dimension, entity_type, args.entity.id);
            } else {
                println!("{} {} has no manual {}", entity_type, args.entity.id, dimension);
            }
            Ok(())
        }
        Command::Delete(args) => {
            let entity_type: EntityType = args.entity.parse()?;
            if store.delete(entity_type, &args.id).await? {
                println!("Deleted metrics of {} {}", entity_type, args.id);
            } else {
                println!("No metrics stored for {} {}", entity_type, args.id);
            }
            Ok(())
        }
    }
}

/// Builds the engine configuration from the config file and CLI flags.
fn engine_config(global: &GlobalArgs, args: &CalculateArgs) -> Result<EngineConfig> {
    let mut config = match &global.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(page_size) = global.page_size {
        config = config.with_page_size(page_size);
    }
    if let Some(path) = &global.storage_path {
        config = config.with_storage_path(path);
    }
    if args.force {
        config = config.with_force_recalculate(true);
    }
    if !args.dimension.iter().any(|d| d.eq_ignore_ascii_case("all")) {
        let dimensions = args
            .dimension
            .iter()
            .map(|d| d.parse::<Dimension>())
            .collect::<dqmetrics_core::Result<Vec<_>>>()?;
        config = config.with_dimensions(dimensions);
    }

    config.validate()?;
    Ok(config)
}

async fn calculate(global: &GlobalArgs, args: &CalculateArgs, store: Arc<dyn MetricsStore>) -> Result<()> {
    let config = engine_config(global, args)?;
    let catalog = Arc::new(DirectoryCatalog::new(&global.catalog));
    let mut provider = LocalFileProvider::new();
    if let Some(path) = &config.storage_path {
        provider = provider.with_storage_path(path);
    }
    if let Some(api_key) = &global.api_key {
        provider = provider.with_downloader(HttpDownloader::new().with_api_key(api_key));
    }

    let dataset_ids = if args.dataset == "all" {
        catalog
            .list_datasets()
            .await
            .with_context(|| format!("listing datasets in {}", global.catalog.display()))?
    } else {
        vec![args.dataset.clone()]
    };
    if dataset_ids.is_empty() {
        bail!("No datasets found in {}", global.catalog.display());
    }

    let engine = DataQualityMetrics::new(config, catalog, Arc::new(provider), store);
    info!(
        "Calculating {} for {} dataset(s)",
        engine.metric_names().join(", "),
        dataset_ids.len()
    );

    let mut failures = 0;
    for dataset_id in &dataset_ids {
        match engine.calculate_metrics_for_dataset(dataset_id).await {
            Ok(record) => {
                println!("{}", record.ref_id);
                for name in engine.metric_names() {
                    let value = record
                        .metrics
                        .get(name)
                        .and_then(|d| d.value().cloned())
                        .unwrap_or(Value::Null);
                    println!("  {:<13} {}", name, value);
                }
            }
            Err(e) => {
                error!("Failed to calculate metrics of dataset {}: {}", dataset_id, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} dataset(s) failed", failures, dataset_ids.len());
    }
    Ok(())
}

async fn show(args: &ShowArgs, store: &dyn MetricsStore) -> Result<()> {
    let report = match (&args.dataset, &args.resource) {
        (Some(dataset_id), _) => package_data_quality(store, dataset_id).await?,
        (None, Some(resource_id)) => resource_data_quality(store, resource_id).await?,
        (None, None) => bail!("Either --dataset or --resource is required"),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_overrides(path: &Path) -> Result<BTreeMap<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading overrides file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing overrides file {}", path.display()))
}
