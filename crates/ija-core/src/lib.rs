//! Core domain model for IJA: raw collection records, the canonical job record,
//! and the sentinel conventions shared by every pipeline stage.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "ija-core";

/// Text sentinel for values that could not be determined.
pub const NOT_SPECIFIED: &str = "Not specified";

/// One flat key-value record as handed over by the acquisition side.
pub type RawRecord = serde_json::Map<String, JsonValue>;

/// Which of the two raw collections a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Search,
    Detail,
}

impl CollectionKind {
    /// Name of the free-text description column for this collection.
    pub fn description_column(self) -> &'static str {
        match self {
            Self::Search => "description_snippet",
            Self::Detail => "description",
        }
    }
}

/// Identifying key used to match records across collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKey {
    JobId,
    Url,
}

impl JoinKey {
    /// Candidate keys in preference order.
    pub const PREFERENCE: [JoinKey; 2] = [JoinKey::JobId, JoinKey::Url];

    pub fn column(self) -> &'static str {
        match self {
            Self::JobId => "job_id",
            Self::Url => "url",
        }
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobLevel {
    Senior,
    #[serde(rename = "Mid-level")]
    MidLevel,
    Junior,
}

impl JobLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Senior => "Senior",
            Self::MidLevel => "Mid-level",
            Self::Junior => "Junior",
        }
    }
}

impl fmt::Display for JobLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SalaryCompetitiveness {
    High,
    Average,
    Low,
    Unknown,
}

impl SalaryCompetitiveness {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Average => "Average",
            Self::Low => "Low",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SalaryCompetitiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, feature-enriched representation of one posting.
///
/// Field order is the column order of every snapshot; fields the pipeline does
/// not know about are kept in `extra` and serialized after the known columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJobRecord {
    pub job_id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: String,
    pub job_type: String,
    pub salary: String,
    pub min_salary: Option<f64>,
    pub max_salary: Option<f64>,
    pub salary_period: String,
    pub avg_salary: Option<f64>,
    pub education_required: String,
    #[serde(with = "not_specified", default)]
    pub years_experience: Option<u32>,
    pub skills_mentioned: Vec<String>,
    pub skills_mentioned_count: usize,
    pub job_level: JobLevel,
    pub is_remote: bool,
    pub salary_competitiveness: SalaryCompetitiveness,
    pub date_processed: NaiveDate,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl CanonicalJobRecord {
    /// Value of the identifying key column for this record.
    pub fn key(&self, key: JoinKey) -> Option<&str> {
        match key {
            JoinKey::JobId => self.job_id.as_deref(),
            JoinKey::Url => self.url.as_deref(),
        }
    }
}

/// True for values that count as "no information": absent, null, blank, or the
/// text sentinel.
pub fn is_missing(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::String(s)) => s.trim().is_empty() || s == NOT_SPECIFIED,
        Some(_) => false,
    }
}

/// Text rendition of a scalar JSON value. Arrays and objects have none.
pub fn text_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Serializes `Option<u32>` as either the number or the `"Not specified"` text.
pub mod not_specified {
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    use super::NOT_SPECIFIED;

    pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(n) => serializer.serialize_u32(*n),
            None => serializer.serialize_str(NOT_SPECIFIED),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u32),
            Text(String),
            Null(()),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(Some(n)),
            Repr::Null(()) => Ok(None),
            Repr::Text(s) if s == NOT_SPECIFIED => Ok(None),
            Repr::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("expected years or {NOT_SPECIFIED:?}, got {s:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CanonicalJobRecord {
        CanonicalJobRecord {
            job_id: Some("abc123".into()),
            url: Some("https://www.indeed.com/viewjob?jk=abc123".into()),
            title: Some("Data Analyst".into()),
            company: Some("Acme".into()),
            location: "Austin, TX".into(),
            job_type: "Full-time".into(),
            salary: NOT_SPECIFIED.into(),
            min_salary: None,
            max_salary: None,
            salary_period: NOT_SPECIFIED.into(),
            avg_salary: None,
            education_required: NOT_SPECIFIED.into(),
            years_experience: None,
            skills_mentioned: vec!["SQL".into()],
            skills_mentioned_count: 1,
            job_level: JobLevel::MidLevel,
            is_remote: false,
            salary_competitiveness: SalaryCompetitiveness::Unknown,
            date_processed: NaiveDate::from_ymd_opt(2025, 4, 14).unwrap(),
            extra: BTreeMap::from([("benefits".to_string(), json!(["401(k)"]))]),
        }
    }

    #[test]
    fn canonical_record_uses_contract_vocabulary() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["years_experience"], json!("Not specified"));
        assert_eq!(value["job_level"], json!("Mid-level"));
        assert_eq!(value["salary_competitiveness"], json!("Unknown"));
        assert_eq!(value["date_processed"], json!("2025-04-14"));
        assert_eq!(value["benefits"], json!(["401(k)"]));
        assert!(value["min_salary"].is_null());
    }

    #[test]
    fn canonical_record_reads_back_numeric_experience() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value["years_experience"] = json!(3);
        let record: CanonicalJobRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.years_experience, Some(3));
        assert_eq!(record.extra.get("benefits"), Some(&json!(["401(k)"])));
    }

    #[test]
    fn missing_values_include_sentinel_and_blank_text() {
        assert!(is_missing(None));
        assert!(is_missing(Some(&JsonValue::Null)));
        assert!(is_missing(Some(&json!("Not specified"))));
        assert!(is_missing(Some(&json!("  "))));
        assert!(!is_missing(Some(&json!("Remote"))));
        assert!(!is_missing(Some(&json!(0))));
    }
}
