//! Batch pipeline: normalize both raw collections, extract entities from job
//! details, reconcile on the identifying key, derive features and write an
//! immutable snapshot.

pub mod config;
pub mod extract;
pub mod features;
pub mod normalize;
pub mod reconcile;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use ija_core::{CanonicalJobRecord, CollectionKind, JoinKey, RawRecord};
use ija_storage::{RawStore, SnapshotStore};
use serde::Serialize;
use tracing::{info, info_span};
use uuid::Uuid;

pub use config::PipelineConfig;
use config::FeatureConfig;
use extract::EntityExtractor;
use normalize::FieldNormalizer;

pub const CRATE_NAME: &str = "ija-pipeline";

/// Snapshot timestamps sort lexicographically in chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct IjaConfig {
    pub raw_data_dir: PathBuf,
    pub processed_data_dir: PathBuf,
    pub rules_file: Option<PathBuf>,
}

impl IjaConfig {
    pub fn from_env() -> Self {
        Self {
            raw_data_dir: std::env::var("IJA_RAW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/raw")),
            processed_data_dir: std::env::var("IJA_PROCESSED_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/processed")),
            rules_file: std::env::var("IJA_RULES_FILE").ok().map(PathBuf::from),
        }
    }

    /// Built-in rules, overridden by the rules file when one is configured.
    pub async fn pipeline_config(&self) -> Result<PipelineConfig> {
        let Some(path) = &self.rules_file else {
            return Ok(PipelineConfig::default());
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading rules file {}", path.display()))?;
        PipelineConfig::from_yaml_str(&text)
            .with_context(|| format!("loading rules file {}", path.display()))
    }
}

/// Canonical table produced by one pass over a collection pair.
#[derive(Debug, Clone)]
pub struct ProcessedTable {
    pub key: Option<JoinKey>,
    pub degraded: bool,
    pub records: Vec<CanonicalJobRecord>,
    pub matched_rows: usize,
    pub dropped_duplicates: usize,
    pub keyless_rows: usize,
    pub median_salary: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStats {
    pub listings: usize,
    pub unique_companies: usize,
    pub unique_locations: usize,
    pub mean_salary: Option<f64>,
    pub median_salary: Option<f64>,
    pub mean_skills: Option<f64>,
}

impl TableStats {
    pub fn from_records(records: &[CanonicalJobRecord]) -> Self {
        let companies: BTreeSet<&str> = records.iter().filter_map(|r| r.company.as_deref()).collect();
        let locations: BTreeSet<&str> = records.iter().map(|r| r.location.as_str()).collect();
        let salaries: Vec<f64> = records.iter().filter_map(|r| r.avg_salary).collect();
        let skills: Vec<f64> = records.iter().map(|r| r.skills_mentioned_count as f64).collect();

        Self {
            listings: records.len(),
            unique_companies: companies.len(),
            unique_locations: locations.len(),
            mean_salary: mean(&salaries),
            median_salary: features::median(&salaries),
            mean_skills: mean(&skills),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub timestamp: String,
    pub source_manifest: String,
    pub key: Option<JoinKey>,
    pub degraded: bool,
    pub dropped_duplicates: usize,
    pub keyless_rows: usize,
    pub stats: TableStats,
    pub table_snapshot: String,
    pub records_snapshot: String,
    pub snapshot_manifest: String,
}

pub struct JobPipeline {
    normalizer: FieldNormalizer,
    extractor: EntityExtractor,
    features: FeatureConfig,
}

impl JobPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let extractor = EntityExtractor::new(&config.extract).context("compiling extraction rules")?;
        Ok(Self {
            normalizer: FieldNormalizer::new(&config.normalize),
            extractor,
            features: config.features,
        })
    }

    /// Pure transformation of one collection pair. Inputs are not modified.
    pub fn process(
        &self,
        search: &[RawRecord],
        details: &[RawRecord],
        processed_on: NaiveDate,
    ) -> ProcessedTable {
        let span = info_span!("process", search = search.len(), details = details.len());
        let _guard = span.enter();

        let search = self.normalizer.normalize(search, CollectionKind::Search, processed_on);
        let details = self.normalizer.normalize(details, CollectionKind::Detail, processed_on);
        let details = self.extractor.apply(details);
        let table = reconcile::reconcile(&search, details);

        let (key, degraded, matched_rows, dropped_duplicates, keyless_rows) = (
            table.key,
            table.degraded,
            table.matched_rows,
            table.dropped_duplicates,
            table.keyless_rows,
        );
        let (records, median_salary) = features::derive(table, &self.features, processed_on);

        ProcessedTable {
            key,
            degraded,
            records,
            matched_rows,
            dropped_duplicates,
            keyless_rows,
            median_salary,
        }
    }

    /// Load the newest raw pair, process it and write a snapshot named by
    /// `timestamp`.
    pub async fn run(
        &self,
        raw: &RawStore,
        snapshots: &SnapshotStore,
        timestamp: &str,
        processed_on: NaiveDate,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let collections = raw.load_latest().await.context("loading raw collections")?;
        let table = self.process(&collections.search, &collections.details, processed_on);

        let files = snapshots
            .write(run_id, timestamp, &table.records)
            .await
            .context("writing processed snapshot")?;
        let stats = TableStats::from_records(&table.records);
        info!(
            %run_id,
            timestamp,
            listings = stats.listings,
            degraded = table.degraded,
            "pipeline run complete"
        );

        Ok(RunSummary {
            run_id,
            timestamp: timestamp.to_string(),
            source_manifest: collections.manifest_path.display().to_string(),
            key: table.key,
            degraded: table.degraded,
            dropped_duplicates: table.dropped_duplicates,
            keyless_rows: table.keyless_rows,
            stats,
            table_snapshot: files.parquet_path.display().to_string(),
            records_snapshot: files.json_path.display().to_string(),
            snapshot_manifest: files.manifest_path.display().to_string(),
        })
    }
}

pub async fn run_once(config: &IjaConfig) -> Result<RunSummary> {
    let pipeline = JobPipeline::new(config.pipeline_config().await?)?;
    let now = Local::now();
    pipeline
        .run(
            &RawStore::new(&config.raw_data_dir),
            &SnapshotStore::new(&config.processed_data_dir),
            &now.format(TIMESTAMP_FORMAT).to_string(),
            now.date_naive(),
        )
        .await
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    run_once(&IjaConfig::from_env()).await
}
