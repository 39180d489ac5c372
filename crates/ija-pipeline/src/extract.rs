//! Rule-table inference of education, experience and skills from description text.
//!
//! Each field is decided by an ordered list of total rules; the first rule that
//! yields a value wins and an exhausted list means "Not specified".

use ija_core::{text_value, RawRecord, NOT_SPECIFIED};
use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use crate::config::{ExtractConfig, MatchMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {what} pattern {pattern:?}")]
    InvalidPattern {
        what: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("experience pattern {0:?} has no capture group for the year count")]
    MissingYearsGroup(String),
}

/// Keyword test against already-lowercased text.
#[derive(Debug, Clone)]
pub enum KeywordMatcher {
    Substring(String),
    WholeWord(Regex),
}

impl KeywordMatcher {
    pub fn new(keyword: &str, mode: MatchMode) -> Result<Self, ConfigError> {
        match mode {
            MatchMode::Substring => Ok(Self::Substring(keyword.to_lowercase())),
            MatchMode::WholeWord => whole_word(keyword).map(Self::WholeWord),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Substring(needle) => text.contains(needle.as_str()),
            Self::WholeWord(re) => re.is_match(text),
        }
    }
}

/// Case-insensitive match of `term` not glued to other word characters. Terms
/// like `C++` or `C#` end in punctuation, so `\b` is not usable here.
fn whole_word(term: &str) -> Result<Regex, ConfigError> {
    let pattern = format!(r"(?i)(?:^|[^\w]){}(?:[^\w]|$)", regex::escape(term));
    Regex::new(&pattern).map_err(|source| ConfigError::InvalidPattern {
        what: "keyword",
        pattern,
        source,
    })
}

#[derive(Debug, Clone)]
pub struct EducationRule {
    pub matcher: KeywordMatcher,
    pub level: String,
}

#[derive(Debug, Clone)]
pub enum ExperienceRule {
    /// Smallest year count stated explicitly ("3+ years of experience").
    StatedYears(Regex),
    /// Any keyword present implies a fixed year count.
    Keywords { keywords: Vec<String>, years: u32 },
}

impl ExperienceRule {
    pub fn apply(&self, lowered: &str) -> Option<u32> {
        match self {
            Self::StatedYears(re) => re
                .captures_iter(lowered)
                .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
                .min(),
            Self::Keywords { keywords, years } => keywords
                .iter()
                .any(|k| lowered.contains(k.as_str()))
                .then_some(*years),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkillTerm {
    pub name: String,
    pub column: String,
    matcher: Regex,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkillMatches {
    /// `(column, present)` for every vocabulary term, in vocabulary order.
    pub flags: Vec<(String, bool)>,
    pub mentioned: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub education: Option<String>,
    pub years_experience: Option<u32>,
    pub skills: SkillMatches,
}

pub struct EntityExtractor {
    education: Vec<EducationRule>,
    experience: Vec<ExperienceRule>,
    skills: Vec<SkillTerm>,
}

impl EntityExtractor {
    pub fn new(config: &ExtractConfig) -> Result<Self, ConfigError> {
        let education = config
            .education
            .iter()
            .map(|rule| {
                Ok(EducationRule {
                    matcher: KeywordMatcher::new(&rule.keyword, config.education_match)?,
                    level: rule.level.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let stated = Regex::new(&config.experience_pattern).map_err(|source| ConfigError::InvalidPattern {
            what: "experience",
            pattern: config.experience_pattern.clone(),
            source,
        })?;
        if stated.captures_len() < 2 {
            return Err(ConfigError::MissingYearsGroup(config.experience_pattern.clone()));
        }
        let mut experience = vec![ExperienceRule::StatedYears(stated)];
        experience.extend(config.seniority_fallbacks.iter().map(|rule| ExperienceRule::Keywords {
            keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
            years: rule.years,
        }));

        let skills = config
            .skills
            .iter()
            .map(|name| {
                Ok(SkillTerm {
                    name: name.clone(),
                    column: format!("skill_{}", name.to_lowercase()),
                    matcher: whole_word(name)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            education,
            experience,
            skills,
        })
    }

    pub fn education(&self, description: &str) -> Option<&str> {
        let lowered = description.to_lowercase();
        self.education
            .iter()
            .find(|rule| rule.matcher.is_match(&lowered))
            .map(|rule| rule.level.as_str())
    }

    pub fn years_experience(&self, description: &str) -> Option<u32> {
        let lowered = description.to_lowercase();
        self.experience.iter().find_map(|rule| rule.apply(&lowered))
    }

    pub fn skills(&self, description: &str) -> SkillMatches {
        let mut matches = SkillMatches::default();
        for term in &self.skills {
            let present = term.matcher.is_match(description);
            if present {
                matches.mentioned.push(term.name.clone());
            }
            matches.flags.push((term.column.clone(), present));
        }
        matches
    }

    pub fn extract(&self, description: &str) -> Extraction {
        Extraction {
            education: self.education(description).map(str::to_string),
            years_experience: self.years_experience(description),
            skills: self.skills(description),
        }
    }

    /// Add extracted columns to every detail record.
    pub fn apply(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        let mut with_education = 0usize;
        let mut with_experience = 0usize;

        let out: Vec<RawRecord> = records
            .into_iter()
            .map(|mut record| {
                let description = record
                    .get("description")
                    .and_then(text_value)
                    .unwrap_or_default();
                let extraction = self.extract(&description);
                with_education += usize::from(extraction.education.is_some());
                with_experience += usize::from(extraction.years_experience.is_some());

                record.insert(
                    "education_required".into(),
                    JsonValue::from(extraction.education.as_deref().unwrap_or(NOT_SPECIFIED)),
                );
                record.insert(
                    "years_experience".into(),
                    extraction
                        .years_experience
                        .map(JsonValue::from)
                        .unwrap_or_else(|| JsonValue::from(NOT_SPECIFIED)),
                );
                for (column, present) in &extraction.skills.flags {
                    record.insert(column.clone(), JsonValue::Bool(*present));
                }
                record.insert(
                    "skills_mentioned_count".into(),
                    JsonValue::from(extraction.skills.mentioned.len()),
                );
                record.insert(
                    "skills_mentioned".into(),
                    JsonValue::from(extraction.skills.mentioned),
                );
                record
            })
            .collect();

        info!(
            rows = out.len(),
            with_education,
            with_experience,
            "extracted entities from descriptions"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EducationRule as EducationConfig;
    use serde_json::json;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(&ExtractConfig::default()).unwrap()
    }

    #[test]
    fn minimum_stated_years_wins() {
        let e = extractor();
        assert_eq!(
            e.years_experience("5+ years experience required; 3 years of experience with Tableau"),
            Some(3)
        );
        assert_eq!(e.years_experience("2-4 years of experience"), Some(2));
        assert_eq!(e.years_experience("1 year experience"), Some(1));
    }

    #[test]
    fn seniority_fallbacks_apply_in_order() {
        let e = extractor();
        assert_eq!(e.years_experience("A senior mid-level analyst role"), Some(5));
        assert_eq!(e.years_experience("Intermediate SQL users welcome"), Some(3));
        assert_eq!(e.years_experience("Great entry point into analytics"), Some(1));
        assert_eq!(e.years_experience("We value curiosity"), None);
        assert_eq!(e.years_experience(""), None);
    }

    #[test]
    fn education_first_rule_wins() {
        let e = extractor();
        assert_eq!(
            e.education("PhD preferred, Master's degree in Statistics required"),
            Some("Master's degree")
        );
        assert_eq!(e.education("Bachelor or Master in a quantitative field"), Some("Bachelor's degree"));
        assert_eq!(e.education("Completed high school or GED"), Some("High School Diploma"));
        assert_eq!(e.education("Strong communicator"), None);
    }

    #[test]
    fn education_keywords_match_inflected_forms() {
        let e = extractor();
        assert_eq!(
            e.education("Bachelors degree in a quantitative field required"),
            Some("Bachelor's degree")
        );
        assert_eq!(e.education("Masters in Statistics preferred"), Some("Master's degree"));
        assert_eq!(e.education("Ph.D. or doctorates welcome"), Some("PhD"));
    }

    #[test]
    fn default_education_scan_matches_inside_words() {
        assert_eq!(extractor().education("Work with our database teams"), Some("Bachelor's degree"));
    }

    #[test]
    fn whole_word_education_mode_requires_word_boundaries() {
        let mut config = ExtractConfig::default();
        config.education_match = MatchMode::WholeWord;
        let e = EntityExtractor::new(&config).unwrap();
        assert_eq!(e.education("Work with our database teams"), None);
        assert_eq!(e.education("BA in economics"), Some("Bachelor's degree"));
    }

    #[test]
    fn skills_are_whole_word_in_vocabulary_order() {
        let e = extractor();
        let found = e.skills("Python and sql daily; MySQL a plus. C++ or C# welcome. Rust fans too.");
        assert_eq!(found.mentioned, vec!["SQL", "Python", "C#", "C++", "MySQL"]);
        assert_eq!(found.flags.len(), 76);
        assert!(found.flags.contains(&("skill_sql".to_string(), true)));
        assert!(found.flags.contains(&("skill_r".to_string(), false)));
    }

    #[test]
    fn apply_writes_extracted_columns() {
        let record: RawRecord = serde_json::from_value(json!({
            "job_id": "x",
            "description": "Need 5+ years experience with SQL and Python.",
        }))
        .unwrap();
        let out = extractor().apply(vec![record]);
        assert_eq!(out[0]["education_required"], json!(NOT_SPECIFIED));
        assert_eq!(out[0]["years_experience"], json!(5));
        assert_eq!(out[0]["skills_mentioned"], json!(["SQL", "Python"]));
        assert_eq!(out[0]["skills_mentioned_count"], json!(2));
        assert_eq!(out[0]["skill_python"], json!(true));

        let empty = extractor().apply(vec![RawRecord::new()]);
        assert_eq!(empty[0]["years_experience"], json!(NOT_SPECIFIED));
        assert_eq!(empty[0]["skills_mentioned"], json!([]));
    }

    #[test]
    fn invalid_experience_pattern_is_rejected() {
        let mut config = ExtractConfig::default();
        config.experience_pattern = "(unclosed".into();
        assert!(matches!(
            EntityExtractor::new(&config),
            Err(ConfigError::InvalidPattern { .. })
        ));
        config.experience_pattern = r"\d+ years".into();
        assert!(matches!(
            EntityExtractor::new(&config),
            Err(ConfigError::MissingYearsGroup(_))
        ));
    }
}
