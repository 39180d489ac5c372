//! Raw collection discovery/loading and immutable canonical snapshot storage for IJA.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{ArrayRef, BooleanArray, Float64Array, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use ija_core::{CanonicalJobRecord, RawRecord};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "ija-storage";

pub const MANIFEST_PREFIX: &str = "collection_summary_";
pub const SNAPSHOT_PREFIX: &str = "processed_jobs";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no data available: no collection_summary_*.json manifest in {}", dir.display())]
    NoDataAvailable { dir: PathBuf },
    #[error("raw collection file missing: {}", path.display())]
    MissingFile { path: PathBuf },
    #[error("reading {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Manifest written by the acquisition side next to each collection pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub timestamp: String,
    pub search_results_file: String,
    pub job_details_file: String,
    #[serde(default)]
    pub search_results_count: Option<usize>,
    #[serde(default)]
    pub job_details_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RawCollections {
    pub manifest_path: PathBuf,
    pub manifest: CollectionManifest,
    pub search: Vec<RawRecord>,
    pub details: Vec<RawRecord>,
}

/// Read-only view over the raw data directory.
#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate the newest manifest. Manifest names carry fixed-width timestamps,
    /// so lexicographic order is chronological order.
    pub async fn latest_manifest(&self) -> Result<(PathBuf, CollectionManifest), StorageError> {
        let no_data = || StorageError::NoDataAvailable {
            dir: self.root.clone(),
        };
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(no_data()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut latest: Option<String> = None;
        loop {
            let entry = entries.next_entry().await.map_err(|source| StorageError::Io {
                path: self.root.clone(),
                source,
            })?;
            let Some(entry) = entry else {
                break;
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(MANIFEST_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            if latest.as_deref().map_or(true, |current| name.as_str() > current) {
                latest = Some(name);
            }
        }

        let name = latest.ok_or_else(no_data)?;
        let path = self.root.join(name);
        let manifest = read_json(&path).await?;
        Ok((path, manifest))
    }

    /// Load the search and detail collections named by the newest manifest.
    pub async fn load_latest(&self) -> Result<RawCollections, StorageError> {
        let (manifest_path, manifest) = self.latest_manifest().await?;
        info!(
            manifest = %manifest_path.display(),
            timestamp = %manifest.timestamp,
            "found latest raw collections"
        );

        let search_path = self.root.join(&manifest.search_results_file);
        let details_path = self.root.join(&manifest.job_details_file);
        let search: Vec<RawRecord> = read_json(&search_path).await?;
        info!(rows = search.len(), path = %search_path.display(), "loaded search results");
        let details: Vec<RawRecord> = read_json(&details_path).await?;
        info!(rows = details.len(), path = %details_path.display(), "loaded job details");

        Ok(RawCollections {
            manifest_path,
            manifest,
            search,
            details,
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(StorageError::MissingFile {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub timestamp: String,
    pub rows: usize,
    pub files: Vec<SnapshotManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct SnapshotFiles {
    pub parquet_path: PathBuf,
    pub json_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Write-once store for canonical tables. Each run lands under its own
/// timestamped names; an existing file is never replaced.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn snapshot_path(&self, timestamp: &str, extension: &str) -> PathBuf {
        self.root
            .join(format!("{SNAPSHOT_PREFIX}_{timestamp}.{}", extension.trim_start_matches('.')))
    }

    pub async fn write(
        &self,
        run_id: Uuid,
        timestamp: &str,
        records: &[CanonicalJobRecord],
    ) -> anyhow::Result<SnapshotFiles> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating {}", self.root.display()))?;

        let parquet_path = self.snapshot_path(timestamp, "parquet");
        let json_path = self.snapshot_path(timestamp, "json");
        let manifest_path = self.snapshot_path(timestamp, "manifest.json");

        let parquet_bytes = canonical_parquet_bytes(records)?;
        let json_bytes = serde_json::to_vec_pretty(records).context("serializing canonical records")?;

        write_new_file(&parquet_path, &parquet_bytes).await?;
        info!(path = %parquet_path.display(), rows = records.len(), "wrote tabular snapshot");
        write_new_file(&json_path, &json_bytes).await?;
        info!(path = %json_path.display(), rows = records.len(), "wrote record snapshot");

        let manifest = SnapshotManifest {
            schema_version: 1,
            run_id,
            timestamp: timestamp.to_string(),
            rows: records.len(),
            files: vec![
                manifest_entry("table", &self.root, &parquet_path, &parquet_bytes),
                manifest_entry("records", &self.root, &json_path, &json_bytes),
            ],
        };
        let manifest_bytes =
            serde_json::to_vec_pretty(&manifest).context("serializing snapshot manifest")?;
        write_new_file(&manifest_path, &manifest_bytes).await?;

        Ok(SnapshotFiles {
            parquet_path,
            json_path,
            manifest_path,
        })
    }
}

fn manifest_entry(name: &str, root: &Path, path: &Path, bytes: &[u8]) -> SnapshotManifestFile {
    let rel = path.strip_prefix(root).unwrap_or(path).display().to_string();
    SnapshotManifestFile {
        name: name.to_string(),
        path: rel,
        sha256: SnapshotStore::sha256_hex(bytes),
        bytes: bytes.len() as u64,
    }
}

/// Write bytes through a temp file and rename into place, refusing to replace
/// an existing target.
async fn write_new_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if fs::try_exists(path)
        .await
        .with_context(|| format!("checking snapshot path {}", path.display()))?
    {
        anyhow::bail!("snapshot {} already exists; refusing to overwrite", path.display());
    }

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp snapshot file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp snapshot file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp snapshot file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!("renaming temp snapshot {} -> {}", temp_path.display(), path.display())
        });
    }
    debug!(path = %path.display(), bytes = bytes.len(), "snapshot file committed");
    Ok(())
}

pub fn canonical_schema() -> Schema {
    Schema::new(vec![
        ArrowField::new("job_id", DataType::Utf8, true),
        ArrowField::new("url", DataType::Utf8, true),
        ArrowField::new("title", DataType::Utf8, true),
        ArrowField::new("company", DataType::Utf8, true),
        ArrowField::new("location", DataType::Utf8, false),
        ArrowField::new("job_type", DataType::Utf8, false),
        ArrowField::new("salary", DataType::Utf8, false),
        ArrowField::new("min_salary", DataType::Float64, true),
        ArrowField::new("max_salary", DataType::Float64, true),
        ArrowField::new("salary_period", DataType::Utf8, false),
        ArrowField::new("avg_salary", DataType::Float64, true),
        ArrowField::new("education_required", DataType::Utf8, false),
        ArrowField::new("years_experience", DataType::UInt32, true),
        ArrowField::new(
            "skills_mentioned",
            DataType::List(Arc::new(ArrowField::new("item", DataType::Utf8, true))),
            false,
        ),
        ArrowField::new("skills_mentioned_count", DataType::UInt64, false),
        ArrowField::new("job_level", DataType::Utf8, false),
        ArrowField::new("is_remote", DataType::Boolean, false),
        ArrowField::new("salary_competitiveness", DataType::Utf8, false),
        ArrowField::new("date_processed", DataType::Utf8, false),
        ArrowField::new("extra_json", DataType::Utf8, false),
    ])
}

fn utf8_column<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<_>>()))
}

pub fn canonical_record_batch(records: &[CanonicalJobRecord]) -> anyhow::Result<RecordBatch> {
    let mut skills = ListBuilder::new(StringBuilder::new());
    for record in records {
        for skill in &record.skills_mentioned {
            skills.values().append_value(skill);
        }
        skills.append(true);
    }

    let extras = records
        .iter()
        .map(|r| serde_json::to_string(&r.extra))
        .collect::<Result<Vec<_>, _>>()
        .context("serializing pass-through fields")?;
    let levels = records.iter().map(|r| r.job_level.as_str());
    let competitiveness = records.iter().map(|r| r.salary_competitiveness.as_str());
    let dates = records
        .iter()
        .map(|r| r.date_processed.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>();

    let columns: Vec<ArrayRef> = vec![
        utf8_column(records.iter().map(|r| r.job_id.as_deref())),
        utf8_column(records.iter().map(|r| r.url.as_deref())),
        utf8_column(records.iter().map(|r| r.title.as_deref())),
        utf8_column(records.iter().map(|r| r.company.as_deref())),
        utf8_column(records.iter().map(|r| Some(r.location.as_str()))),
        utf8_column(records.iter().map(|r| Some(r.job_type.as_str()))),
        utf8_column(records.iter().map(|r| Some(r.salary.as_str()))),
        Arc::new(Float64Array::from(records.iter().map(|r| r.min_salary).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(records.iter().map(|r| r.max_salary).collect::<Vec<_>>())),
        utf8_column(records.iter().map(|r| Some(r.salary_period.as_str()))),
        Arc::new(Float64Array::from(records.iter().map(|r| r.avg_salary).collect::<Vec<_>>())),
        utf8_column(records.iter().map(|r| Some(r.education_required.as_str()))),
        Arc::new(UInt32Array::from(records.iter().map(|r| r.years_experience).collect::<Vec<_>>())),
        Arc::new(skills.finish()),
        Arc::new(UInt64Array::from(
            records.iter().map(|r| r.skills_mentioned_count as u64).collect::<Vec<_>>(),
        )),
        utf8_column(levels.map(Some)),
        Arc::new(BooleanArray::from(records.iter().map(|r| r.is_remote).collect::<Vec<_>>())),
        utf8_column(competitiveness.map(Some)),
        utf8_column(dates.iter().map(|d| Some(d.as_str()))),
        utf8_column(extras.iter().map(|e| Some(e.as_str()))),
    ];

    RecordBatch::try_new(Arc::new(canonical_schema()), columns).context("building canonical record batch")
}

fn canonical_parquet_bytes(records: &[CanonicalJobRecord]) -> anyhow::Result<Vec<u8>> {
    let batch = canonical_record_batch(records)?;
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)
        .context("opening parquet writer")?;
    writer.write(&batch).context("writing canonical record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use ija_core::{JobLevel, SalaryCompetitiveness, NOT_SPECIFIED};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(job_id: &str, skills: &[&str]) -> CanonicalJobRecord {
        CanonicalJobRecord {
            job_id: Some(job_id.to_string()),
            url: None,
            title: Some("Data Analyst".into()),
            company: Some("Acme".into()),
            location: "Remote".into(),
            job_type: "Full-time".into(),
            salary: "$50 - $70 an hour".into(),
            min_salary: Some(104000.0),
            max_salary: Some(145600.0),
            salary_period: "year".into(),
            avg_salary: Some(124800.0),
            education_required: NOT_SPECIFIED.into(),
            years_experience: Some(2),
            skills_mentioned: skills.iter().map(|s| s.to_string()).collect(),
            skills_mentioned_count: skills.len(),
            job_level: JobLevel::MidLevel,
            is_remote: true,
            salary_competitiveness: SalaryCompetitiveness::Average,
            date_processed: NaiveDate::from_ymd_opt(2025, 4, 14).unwrap(),
            extra: BTreeMap::from([("experience_level".to_string(), json!("Mid Level"))]),
        }
    }

    async fn write_raw(dir: &Path, stamp: &str, search: serde_json::Value, details: serde_json::Value) {
        let manifest = json!({
            "timestamp": stamp,
            "search_results_file": format!("indeed_search_results_{stamp}.json"),
            "job_details_file": format!("indeed_job_details_{stamp}.json"),
        });
        fs::write(dir.join(format!("{MANIFEST_PREFIX}{stamp}.json")), manifest.to_string())
            .await
            .unwrap();
        fs::write(dir.join(format!("indeed_search_results_{stamp}.json")), search.to_string())
            .await
            .unwrap();
        fs::write(dir.join(format!("indeed_job_details_{stamp}.json")), details.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn loader_picks_lexicographically_latest_manifest() {
        let dir = tempdir().expect("tempdir");
        write_raw(dir.path(), "20250413_090000", json!([{"job_id": "old"}]), json!([])).await;
        write_raw(dir.path(), "20250414_120000", json!([{"job_id": "new"}]), json!([{"job_id": "new"}])).await;

        let loaded = RawStore::new(dir.path()).load_latest().await.expect("load");
        assert_eq!(loaded.manifest.timestamp, "20250414_120000");
        assert_eq!(loaded.search.len(), 1);
        assert_eq!(loaded.search[0]["job_id"], json!("new"));
        assert_eq!(loaded.details.len(), 1);
    }

    #[tokio::test]
    async fn loader_without_manifest_reports_no_data() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("indeed_search_results_x.json"), "[]").await.unwrap();
        let err = RawStore::new(dir.path()).load_latest().await.unwrap_err();
        assert!(matches!(err, StorageError::NoDataAvailable { .. }));

        let missing_dir = RawStore::new(dir.path().join("nope")).load_latest().await.unwrap_err();
        assert!(matches!(missing_dir, StorageError::NoDataAvailable { .. }));
    }

    #[tokio::test]
    async fn loader_rejects_missing_and_malformed_collections() {
        let dir = tempdir().expect("tempdir");
        write_raw(dir.path(), "20250414_120000", json!([]), json!([])).await;
        fs::remove_file(dir.path().join("indeed_job_details_20250414_120000.json"))
            .await
            .unwrap();
        let err = RawStore::new(dir.path()).load_latest().await.unwrap_err();
        assert!(matches!(err, StorageError::MissingFile { .. }));

        fs::write(dir.path().join("indeed_job_details_20250414_120000.json"), "{not json")
            .await
            .unwrap();
        let err = RawStore::new(dir.path()).load_latest().await.unwrap_err();
        assert!(matches!(err, StorageError::Parse { .. }));
    }

    #[tokio::test]
    async fn snapshots_are_written_once_with_manifest() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path().join("processed"));
        let records = vec![record("a", &["SQL", "Python"]), record("b", &[])];
        let run_id = Uuid::new_v4();

        let files = store.write(run_id, "20250414_120000", &records).await.expect("write");
        assert!(files.parquet_path.ends_with("processed_jobs_20250414_120000.parquet"));

        let json_text = std::fs::read_to_string(&files.json_path).unwrap();
        let back: Vec<CanonicalJobRecord> = serde_json::from_str(&json_text).unwrap();
        assert_eq!(back, records);

        let manifest: SnapshotManifest =
            serde_json::from_str(&std::fs::read_to_string(&files.manifest_path).unwrap()).unwrap();
        assert_eq!(manifest.rows, 2);
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(
            manifest.files[1].sha256,
            SnapshotStore::sha256_hex(json_text.as_bytes())
        );

        let file = std::fs::File::open(&files.parquet_path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);

        let again = store.write(run_id, "20250414_120000", &records).await;
        assert!(again.is_err());
    }

    #[test]
    fn record_batch_follows_contract_column_order() {
        let batch = canonical_record_batch(&[record("a", &["SQL"])]).unwrap();
        let names: Vec<_> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names[..4], ["job_id", "url", "title", "company"]);
        assert!(names.contains(&"skills_mentioned".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("extra_json"));
    }

    #[test]
    fn snapshot_hashing_is_stable() {
        assert_eq!(
            SnapshotStore::sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
