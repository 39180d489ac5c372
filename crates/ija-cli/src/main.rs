use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ija_pipeline::{IjaConfig, RunSummary};
use ija_storage::RawStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ija-cli")]
#[command(about = "Job posting normalization and snapshot pipeline")]
struct Cli {
    /// Directory holding collection manifests and raw JSON collections.
    #[arg(long, global = true)]
    raw_dir: Option<PathBuf>,
    /// Directory processed snapshots are written to.
    #[arg(long, global = true)]
    processed_dir: Option<PathBuf>,
    /// YAML file overriding the built-in extraction and feature rules.
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process the latest raw collections into a new snapshot.
    Process,
    /// Show the collection manifest the next run would pick.
    Latest,
    /// Print the effective pipeline rules as YAML.
    Config,
}

impl Cli {
    fn config(&self) -> IjaConfig {
        let mut config = IjaConfig::from_env();
        if let Some(dir) = &self.raw_dir {
            config.raw_data_dir = dir.clone();
        }
        if let Some(dir) = &self.processed_dir {
            config.processed_data_dir = dir.clone();
        }
        if let Some(rules) = &self.rules {
            config.rules_file = Some(rules.clone());
        }
        config
    }
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    let money = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.0}"));
    println!(
        "process complete: run_id={} key={} degraded={} listings={} companies={} locations={}",
        summary.run_id,
        summary.key.map_or_else(|| "none".to_string(), |k| k.to_string()),
        summary.degraded,
        stats.listings,
        stats.unique_companies,
        stats.unique_locations,
    );
    println!(
        "salary mean={} median={} skills_per_listing={}",
        money(stats.mean_salary),
        money(stats.median_salary),
        stats.mean_skills.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}")),
    );
    println!("table: {}", summary.table_snapshot);
    println!("records: {}", summary.records_snapshot);
    println!("manifest: {}", summary.snapshot_manifest);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    match cli.command.unwrap_or(Commands::Process) {
        Commands::Process => {
            let summary = ija_pipeline::run_once(&config).await?;
            print_summary(&summary);
        }
        Commands::Latest => {
            let (path, manifest) = RawStore::new(&config.raw_data_dir).latest_manifest().await?;
            println!("{}", path.display());
            println!(
                "{}",
                serde_json::to_string_pretty(&manifest).context("rendering manifest")?
            );
        }
        Commands::Config => {
            let rules = config.pipeline_config().await?;
            print!("{}", rules.to_yaml()?);
        }
    }

    Ok(())
}
