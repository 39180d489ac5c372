//! Derived columns and conversion of reconciled rows into canonical records.

use chrono::NaiveDate;
use ija_core::{
    is_missing, text_value, CanonicalJobRecord, JobLevel, RawRecord, SalaryCompetitiveness,
    NOT_SPECIFIED,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::config::FeatureConfig;
use crate::reconcile::ReconciledTable;

/// Median of the given values; `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Unknown experience is treated as zero years.
pub fn job_level(title: Option<&str>, years_experience: Option<u32>, config: &FeatureConfig) -> JobLevel {
    let title = title.unwrap_or_default().to_lowercase();
    let years = years_experience.unwrap_or(0);
    let title_has = |keywords: &[String]| keywords.iter().any(|k| title.contains(&k.to_lowercase()));

    if title_has(&config.senior_title_keywords) || years >= config.senior_min_years {
        JobLevel::Senior
    } else if title_has(&config.junior_title_keywords) || years <= config.junior_max_years {
        JobLevel::Junior
    } else {
        JobLevel::MidLevel
    }
}

pub fn is_remote(location: &str) -> bool {
    location.to_lowercase().contains("remote")
}

pub fn salary_competitiveness(
    avg_salary: Option<f64>,
    median_salary: Option<f64>,
    config: &FeatureConfig,
) -> SalaryCompetitiveness {
    let (Some(avg), Some(median)) = (avg_salary, median_salary) else {
        return SalaryCompetitiveness::Unknown;
    };
    if avg == 0.0 || median == 0.0 {
        return SalaryCompetitiveness::Unknown;
    }
    let ratio = avg / median;
    if ratio > config.high_ratio {
        SalaryCompetitiveness::High
    } else if ratio < config.low_ratio {
        SalaryCompetitiveness::Low
    } else {
        SalaryCompetitiveness::Average
    }
}

fn take_text(record: &mut RawRecord, column: &str) -> Option<String> {
    let value = record.remove(column)?;
    if value.is_null() {
        return None;
    }
    text_value(&value)
}

fn take_label(record: &mut RawRecord, column: &str) -> String {
    let value = record.remove(column);
    if is_missing(value.as_ref()) {
        return NOT_SPECIFIED.to_string();
    }
    value
        .as_ref()
        .and_then(text_value)
        .unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

fn take_amount(record: &mut RawRecord, column: &str) -> Option<f64> {
    record
        .remove(column)
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite())
}

fn take_years(record: &mut RawRecord) -> Option<u32> {
    match record.remove("years_experience")? {
        JsonValue::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn take_skills(record: &mut RawRecord) -> Vec<String> {
    match record.remove("skills_mentioned") {
        Some(JsonValue::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                JsonValue::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Build the canonical record for one row; feature columns are filled later.
fn canonical_row(mut record: RawRecord, processed_on: NaiveDate) -> CanonicalJobRecord {
    let job_id = take_text(&mut record, "job_id");
    let url = take_text(&mut record, "url");
    let title = take_text(&mut record, "title");
    let company = take_text(&mut record, "company");
    let location = take_label(&mut record, "location");
    let job_type = take_label(&mut record, "job_type");
    let salary = take_label(&mut record, "salary");
    let education_required = take_label(&mut record, "education_required");

    let mut min_salary = take_amount(&mut record, "min_salary");
    let mut max_salary = take_amount(&mut record, "max_salary");
    let period = take_label(&mut record, "salary_period");
    record.remove("avg_salary");
    let (avg_salary, salary_period) = match (min_salary, max_salary) {
        (Some(min), Some(max)) => {
            if min > max {
                min_salary = Some(max);
                max_salary = Some(min);
            }
            (Some((min + max) / 2.0), period)
        }
        _ => {
            min_salary = None;
            max_salary = None;
            (None, NOT_SPECIFIED.to_string())
        }
    };

    let years_experience = take_years(&mut record);
    let skills_mentioned = take_skills(&mut record);
    record.remove("skills_mentioned_count");

    let date_processed = take_text(&mut record, "date_processed")
        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
        .unwrap_or(processed_on);

    for derived in ["job_level", "is_remote", "salary_competitiveness"] {
        record.remove(derived);
    }

    CanonicalJobRecord {
        job_id,
        url,
        title,
        company,
        is_remote: is_remote(&location),
        location,
        job_type,
        salary,
        min_salary,
        max_salary,
        salary_period,
        avg_salary,
        education_required,
        years_experience,
        skills_mentioned_count: skills_mentioned.len(),
        skills_mentioned,
        job_level: JobLevel::MidLevel,
        salary_competitiveness: SalaryCompetitiveness::Unknown,
        date_processed,
        extra: record.into_iter().collect(),
    }
}

/// Turn the reconciled table into canonical records with derived features.
/// Returns the records and the median salary the competitiveness was judged
/// against.
pub fn derive(
    table: ReconciledTable,
    config: &FeatureConfig,
    processed_on: NaiveDate,
) -> (Vec<CanonicalJobRecord>, Option<f64>) {
    let mut records: Vec<CanonicalJobRecord> = table
        .rows
        .into_iter()
        .map(|row| canonical_row(row, processed_on))
        .collect();

    let salaries: Vec<f64> = records.iter().filter_map(|r| r.avg_salary).collect();
    let median_salary = median(&salaries);
    debug!(with_salary = salaries.len(), ?median_salary, "salary baseline");

    for record in &mut records {
        record.job_level = job_level(record.title.as_deref(), record.years_experience, config);
        record.salary_competitiveness = salary_competitiveness(record.avg_salary, median_salary, config);
    }

    info!(
        rows = records.len(),
        remote = records.iter().filter(|r| r.is_remote).count(),
        "derived features"
    );
    (records, median_salary)
}
