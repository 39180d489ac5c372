//! Per-collection field cleanup: sentinels, location, job type and salary.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ija_core::{is_missing, text_value, CollectionKind, RawRecord, NOT_SPECIFIED};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Number, Value as JsonValue};
use tracing::{debug, info};

use crate::config::NormalizeConfig;

lazy_static! {
    static ref SALARY_RE: Regex =
        Regex::new(r"\$([0-9,.]+)\s*-\s*\$([0-9,.]+)\s*(?:an|a|per)\s+(\w+)").unwrap();
    static ref CITY_REGION_RE: Regex = Regex::new(r"([^,]+),\s*([A-Z]{2})").unwrap();
}

/// Parsed salary, already converted to yearly amounts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SalaryRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub period: Option<String>,
}

impl SalaryRange {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn avg(&self) -> Option<f64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some((min + max) / 2.0),
            _ => None,
        }
    }

    pub fn period_label(&self) -> &str {
        self.period.as_deref().unwrap_or(NOT_SPECIFIED)
    }

    fn write_into(&self, record: &mut RawRecord) {
        record.insert("min_salary".into(), number_or_null(self.min));
        record.insert("max_salary".into(), number_or_null(self.max));
        record.insert("salary_period".into(), JsonValue::from(self.period_label()));
        record.insert("avg_salary".into(), number_or_null(self.avg()));
    }
}

fn number_or_null(value: Option<f64>) -> JsonValue {
    value
        .and_then(Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

pub struct FieldNormalizer {
    yearly_factors: BTreeMap<String, f64>,
}

impl FieldNormalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            yearly_factors: config
                .yearly_factors
                .iter()
                .map(|(unit, factor)| (unit.to_ascii_lowercase(), *factor))
                .collect(),
        }
    }

    /// Clean one collection. Input records are left untouched.
    pub fn normalize(
        &self,
        records: &[RawRecord],
        kind: CollectionKind,
        processed_on: NaiveDate,
    ) -> Vec<RawRecord> {
        let stamp = processed_on.format("%Y-%m-%d").to_string();
        let mut parsed_salaries = 0usize;

        let cleaned: Vec<RawRecord> = records
            .iter()
            .map(|raw| {
                let mut record = raw.clone();

                let salary = record
                    .get("salary")
                    .and_then(text_value)
                    .unwrap_or_else(|| NOT_SPECIFIED.to_string());
                let range = self.parse_salary(&salary);
                if range.min.is_some() {
                    parsed_salaries += 1;
                }
                record.insert("salary".into(), JsonValue::from(salary));
                range.write_into(&mut record);

                let description_column = kind.description_column();
                if record.get(description_column).and_then(text_value).is_none() {
                    record.insert(description_column.into(), JsonValue::from(""));
                }

                let location = standardize_location(record.get("location"));
                record.insert("location".into(), JsonValue::from(location));
                let job_type = standardize_job_type(record.get("job_type"));
                record.insert("job_type".into(), JsonValue::from(job_type));

                record.insert("date_processed".into(), JsonValue::from(stamp.as_str()));
                record
            })
            .collect();

        info!(
            collection = ?kind,
            rows = cleaned.len(),
            parsed_salaries,
            "normalized collection"
        );
        cleaned
    }

    /// Parse `$<min> - $<max> <a|an|per> <unit>` into a yearly range. Anything
    /// that does not fit yields [`SalaryRange::unknown`].
    pub fn parse_salary(&self, text: &str) -> SalaryRange {
        let text = text.trim();
        if text.is_empty() || text == "N/A" || text == NOT_SPECIFIED {
            return SalaryRange::unknown();
        }
        let Some(caps) = SALARY_RE.captures(text) else {
            debug!(salary = text, "salary text did not match range pattern");
            return SalaryRange::unknown();
        };

        let (Some(min), Some(max)) = (parse_amount(&caps[1]), parse_amount(&caps[2])) else {
            debug!(salary = text, "salary bounds are not numbers");
            return SalaryRange::unknown();
        };
        let unit = caps[3].to_ascii_lowercase();
        let Some(factor) = self.yearly_factor(&unit) else {
            debug!(salary = text, unit = %unit, "unknown salary unit");
            return SalaryRange::unknown();
        };

        let (min, max) = (min * factor, max * factor);
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        SalaryRange {
            min: Some(min),
            max: Some(max),
            period: Some("year".to_string()),
        }
    }

    /// Factor for a unit as written or with a plural `s` removed.
    fn yearly_factor(&self, unit: &str) -> Option<f64> {
        self.yearly_factors
            .get(unit)
            .or_else(|| unit.strip_suffix('s').and_then(|u| self.yearly_factors.get(u)))
            .copied()
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

pub fn standardize_location(raw: Option<&JsonValue>) -> String {
    let Some(location) = raw.and_then(text_value) else {
        return NOT_SPECIFIED.to_string();
    };
    let trimmed = location.trim();
    if trimmed.is_empty() || trimmed == "N/A" || is_missing(raw) {
        return NOT_SPECIFIED.to_string();
    }
    if trimmed.to_lowercase().contains("remote") {
        return "Remote".to_string();
    }
    if let Some(caps) = CITY_REGION_RE.captures(&location) {
        return format!("{}, {}", caps[1].trim(), caps[2].trim());
    }
    location
}

pub fn standardize_job_type(raw: Option<&JsonValue>) -> String {
    let Some(job_type) = raw.and_then(text_value) else {
        return NOT_SPECIFIED.to_string();
    };
    if job_type.trim().is_empty() || job_type == "N/A" || job_type == NOT_SPECIFIED {
        return NOT_SPECIFIED.to_string();
    }

    let lower = job_type.to_lowercase();
    let label = if lower.contains("full") && lower.contains("time") {
        "Full-time"
    } else if lower.contains("part") && lower.contains("time") {
        "Part-time"
    } else if lower.contains("contract") {
        "Contract"
    } else if lower.contains("temp") {
        "Temporary"
    } else if lower.contains("intern") {
        "Internship"
    } else if lower.contains("remote") {
        "Remote"
    } else {
        return capitalize(&lower);
    };
    label.to_string()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> FieldNormalizer {
        FieldNormalizer::new(&NormalizeConfig::default())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 14).unwrap()
    }

    #[test]
    fn hourly_salary_converts_to_yearly() {
        let range = normalizer().parse_salary("$50 - $70 an hour");
        assert_eq!(range.min, Some(104000.0));
        assert_eq!(range.max, Some(145600.0));
        assert_eq!(range.period_label(), "year");
        assert_eq!(range.avg(), Some(124800.0));
    }

    #[test]
    fn yearly_salary_strips_thousands_separators() {
        let range = normalizer().parse_salary("$65,000 - $85,000 a year");
        assert_eq!(range.min, Some(65000.0));
        assert_eq!(range.max, Some(85000.0));
        assert_eq!(range.avg(), Some(75000.0));
    }

    #[test]
    fn unparseable_salary_degrades_to_sentinel() {
        let n = normalizer();
        for text in ["Not specified", "N/A", "", "Competitive pay", "$1.2.3 - $4 a year", "$40 - $60 a fortnight"] {
            let range = n.parse_salary(text);
            assert_eq!(range, SalaryRange::unknown(), "{text}");
            assert_eq!(range.period_label(), NOT_SPECIFIED);
            assert_eq!(range.avg(), None);
        }
    }

    #[test]
    fn plural_and_abbreviated_units_convert() {
        let n = normalizer();
        let hours = n.parse_salary("$20 - $25 per hours");
        assert_eq!((hours.min, hours.max), (Some(41600.0), Some(52000.0)));
        let yr = n.parse_salary("$90,000 - $100,000 a yr");
        assert_eq!((yr.min, yr.max), (Some(90000.0), Some(100000.0)));
        let months = n.parse_salary("$5,000 - $6,000 per months");
        assert_eq!(months.min, Some(60000.0));
        assert_eq!(n.parse_salary("$1 - $2 per hourss"), SalaryRange::unknown());
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let range = normalizer().parse_salary("$90,000 - $70,000 per year");
        assert_eq!(range.min, Some(70000.0));
        assert_eq!(range.max, Some(90000.0));
    }

    #[test]
    fn locations_standardize() {
        assert_eq!(standardize_location(Some(&json!("Remote in Austin, TX"))), "Remote");
        assert_eq!(standardize_location(Some(&json!("New York,NY 10001"))), "New York, NY");
        assert_eq!(standardize_location(Some(&json!("Seattle, WA"))), "Seattle, WA");
        assert_eq!(standardize_location(Some(&json!("United States"))), "United States");
        assert_eq!(standardize_location(Some(&json!("N/A"))), NOT_SPECIFIED);
        assert_eq!(standardize_location(Some(&JsonValue::Null)), NOT_SPECIFIED);
        assert_eq!(standardize_location(None), NOT_SPECIFIED);
    }

    #[test]
    fn job_types_standardize() {
        assert_eq!(standardize_job_type(Some(&json!("Full time"))), "Full-time");
        assert_eq!(standardize_job_type(Some(&json!("part-time"))), "Part-time");
        assert_eq!(standardize_job_type(Some(&json!("Contract to hire"))), "Contract");
        assert_eq!(standardize_job_type(Some(&json!("Temp"))), "Temporary");
        assert_eq!(standardize_job_type(Some(&json!("Internship"))), "Internship");
        assert_eq!(standardize_job_type(Some(&json!("PER DIEM"))), "Per diem");
        assert_eq!(standardize_job_type(None), NOT_SPECIFIED);
    }

    #[test]
    fn normalize_fills_sentinels_and_stamps_date() {
        let raw: RawRecord = serde_json::from_value(json!({
            "job_id": "a1",
            "salary": null,
            "location": "Chicago, IL",
            "benefits": ["Dental insurance"],
        }))
        .unwrap();

        let out = normalizer().normalize(&[raw.clone()], CollectionKind::Detail, day());
        let record = &out[0];
        assert_eq!(record["salary"], json!(NOT_SPECIFIED));
        assert_eq!(record["description"], json!(""));
        assert_eq!(record["location"], json!("Chicago, IL"));
        assert_eq!(record["job_type"], json!(NOT_SPECIFIED));
        assert!(record["min_salary"].is_null());
        assert!(record["avg_salary"].is_null());
        assert_eq!(record["salary_period"], json!(NOT_SPECIFIED));
        assert_eq!(record["date_processed"], json!("2025-04-14"));
        assert_eq!(record["benefits"], json!(["Dental insurance"]));
        assert!(raw["salary"].is_null());

        let search = normalizer().normalize(&[raw], CollectionKind::Search, day());
        assert_eq!(search[0]["description_snippet"], json!(""));
        assert!(search[0].get("description").is_none());
    }
}
