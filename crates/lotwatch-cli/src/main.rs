mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lotwatch_client::{ReqwestFetcher, SchemaResolver, SelectorParser, SelectorSchema};
use lotwatch_core::diff::{ChangeSummary, diff_snapshots};
use lotwatch_core::traits::{Fetcher, ReportEmitter};
use lotwatch_core::{HarvestConfig, HarvestService, TracingHarvestReporter};
use lotwatch_store::{CsvSnapshotStore, read_artifact, write_artifact};

use crate::report::{ConsoleReport, print_summary};

#[derive(Parser)]
#[command(
    name = "lotwatch",
    version,
    about = "Harvest a classifieds catalog and diff it against the previous run"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest every listing, diff against the prior snapshot and save today's artifact
    Harvest {
        /// Selector schema: a file path, `name@version` or `name@latest`
        #[arg(short, long, env = "LOTWATCH_SCHEMA", default_value = "lindacars@latest")]
        schema: String,

        /// Directory holding versioned selector schemas and registry.json
        #[arg(long, env = "LOTWATCH_SCHEMAS_DIR", default_value = "schemas")]
        schemas_dir: PathBuf,

        /// Directory of dated snapshot artifacts
        #[arg(long, env = "LOTWATCH_SNAPSHOT_DIR", default_value = "snapshots")]
        snapshot_dir: PathBuf,

        /// Number of concurrent listing extractions
        #[arg(short, long, env = "LOTWATCH_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,

        /// Index page timeout in seconds
        #[arg(long, env = "LOTWATCH_PAGE_TIMEOUT", default_value_t = 15)]
        page_timeout: u64,

        /// Listing detail timeout in seconds
        #[arg(long, env = "LOTWATCH_LISTING_TIMEOUT", default_value_t = 15)]
        listing_timeout: u64,

        /// Attempts per page or listing before giving up
        #[arg(long, env = "LOTWATCH_MAX_RETRIES", default_value_t = 3)]
        max_retries: u32,

        /// Longest wait between attempts, in seconds
        #[arg(long, env = "LOTWATCH_RETRY_WAIT", default_value_t = 3)]
        retry_wait: u64,

        /// Capacity of the queue between pagination and extraction
        #[arg(long, env = "LOTWATCH_QUEUE_CAPACITY", default_value_t = 64)]
        queue_capacity: usize,

        /// Render pages in headless Chromium (needs the `browser` feature)
        #[arg(long, env = "LOTWATCH_BROWSER", default_value_t = false)]
        browser: bool,

        /// Print the run report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Diff two saved artifacts
    Diff {
        /// Earlier artifact
        #[arg(long)]
        prior: PathBuf,

        /// Later artifact
        #[arg(long)]
        current: PathBuf,

        /// Write the resulting change records as a new artifact
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Resolve a selector schema and print it
    Schema {
        /// Schema reference: a file path, `name@version` or `name@latest`
        reference: String,

        /// Directory holding versioned selector schemas and registry.json
        #[arg(long, env = "LOTWATCH_SCHEMAS_DIR", default_value = "schemas")]
        schemas_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lotwatch=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            schema,
            schemas_dir,
            snapshot_dir,
            concurrency,
            page_timeout,
            listing_timeout,
            max_retries,
            retry_wait,
            queue_capacity,
            browser,
            json,
        } => {
            let config = HarvestConfig::default()
                .with_concurrency(concurrency)
                .with_page_timeout(Duration::from_secs(page_timeout))
                .with_listing_timeout(Duration::from_secs(listing_timeout))
                .with_max_retries(max_retries)
                .with_retry_wait(Duration::from_secs(retry_wait))
                .with_queue_capacity(queue_capacity);
            let resolved = SchemaResolver::new(&schemas_dir)
                .resolve(&schema)
                .map_err(|e| anyhow::anyhow!(e))?;
            tracing::info!(schema = %resolved.name, "Using selector schema");

            let store = CsvSnapshotStore::new(snapshot_dir);
            let emitter = ConsoleReport::new(json);

            if browser {
                cmd_harvest_browser(&resolved.schema, store, config, &emitter).await?;
            } else {
                let timeout = config.page_timeout.max(config.listing_timeout);
                let fetcher =
                    ReqwestFetcher::with_timeout(timeout).map_err(|e| anyhow::anyhow!(e))?;
                cmd_harvest(fetcher, &resolved.schema, store, config, &emitter).await?;
            }
        }
        Commands::Diff {
            prior,
            current,
            output,
            json,
        } => cmd_diff(&prior, &current, output.as_deref(), json)?,
        Commands::Schema {
            reference,
            schemas_dir,
        } => cmd_schema(&reference, &schemas_dir)?,
    }

    Ok(())
}

async fn cmd_harvest<F: Fetcher>(
    fetcher: F,
    schema: &SelectorSchema,
    store: CsvSnapshotStore,
    config: HarvestConfig,
    emitter: &impl ReportEmitter,
) -> Result<()> {
    let parser = SelectorParser::new(schema).map_err(|e| anyhow::anyhow!(e))?;
    let source = schema.index_source().map_err(|e| anyhow::anyhow!(e))?;
    let rules = schema.assembly_rules().map_err(|e| anyhow::anyhow!(e))?;

    let service = HarvestService::new(fetcher, parser, source, rules, store, config)
        .map_err(|e| anyhow::anyhow!(e))?;

    let today = chrono::Local::now().date_naive();
    let report = service
        .run(today, Arc::new(TracingHarvestReporter))
        .await
        .map_err(|e| {
            let outcome = if e.is_fatal() { "aborted" } else { "failed" };
            anyhow::anyhow!(e).context(format!("Harvest run {outcome}"))
        })?;

    if let Err(e) = emitter.emit(&report).await {
        tracing::error!(error = %e, "Failed to emit run report");
    }
    Ok(())
}

#[cfg(feature = "browser")]
async fn cmd_harvest_browser(
    schema: &SelectorSchema,
    store: CsvSnapshotStore,
    config: HarvestConfig,
    emitter: &impl ReportEmitter,
) -> Result<()> {
    use lotwatch_client::BrowserFetcher;

    // Leave room for settling and reading the DOM inside the fetch timeout.
    let wait = config
        .page_timeout
        .min(config.listing_timeout)
        .saturating_sub(Duration::from_secs(2));
    let mut ready = vec![
        schema
            .index
            .ready
            .clone()
            .unwrap_or_else(|| schema.index.listing_link.clone()),
    ];
    ready.extend(schema.detail.ready.iter().cloned());

    let fetcher = BrowserFetcher::launch(ready, wait)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to start headless browser")?;
    cmd_harvest(fetcher, schema, store, config, emitter).await
}

#[cfg(not(feature = "browser"))]
async fn cmd_harvest_browser(
    _schema: &SelectorSchema,
    _store: CsvSnapshotStore,
    _config: HarvestConfig,
    _emitter: &impl ReportEmitter,
) -> Result<()> {
    anyhow::bail!("--browser requires lotwatch to be built with the `browser` feature")
}

fn cmd_diff(prior: &Path, current: &Path, output: Option<&Path>, json: bool) -> Result<()> {
    let prior = read_artifact(prior)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to read prior artifact {}", prior.display()))?;
    let current = read_artifact(current)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to read current artifact {}", current.display()))?;
    if prior.captured_on() > current.captured_on() {
        tracing::warn!(
            prior = %prior.captured_on(),
            current = %current.captured_on(),
            "Prior artifact is newer than current"
        );
    }

    let records = diff_snapshots(Some(&prior), &current);
    let summary = ChangeSummary::from_records(&records);

    if let Some(path) = output {
        write_artifact(path, &records).map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!(path = %path.display(), rows = records.len(), "Diff artifact written");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{} -> {}", prior.captured_on(), current.captured_on());
        print_summary(&summary, 0, records.len());
    }
    Ok(())
}

fn cmd_schema(reference: &str, schemas_dir: &Path) -> Result<()> {
    let resolved = SchemaResolver::new(schemas_dir)
        .resolve(reference)
        .map_err(|e| anyhow::anyhow!(e))?;

    eprintln!("{} ({})", resolved.name, resolved.path.display());
    println!("{}", serde_json::to_string_pretty(&resolved.schema)?);
    Ok(())
}
