//! Tunable vocabularies and thresholds for every pipeline stage.
//!
//! Defaults are built in; a YAML rules file may override any section.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub normalize: NormalizeConfig,
    pub extract: ExtractConfig,
    pub features: FeatureConfig,
}

impl PipelineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing pipeline rules")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serializing pipeline rules")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Multiplier that turns an amount quoted per unit into a yearly amount.
    pub yearly_factors: BTreeMap<String, f64>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            yearly_factors: BTreeMap::from([
                ("hour".to_string(), 2080.0),
                ("day".to_string(), 260.0),
                ("week".to_string(), 52.0),
                ("month".to_string(), 12.0),
                ("year".to_string(), 1.0),
                ("hr".to_string(), 2080.0),
                ("wk".to_string(), 52.0),
                ("mo".to_string(), 12.0),
                ("yr".to_string(), 1.0),
            ]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    WholeWord,
    #[default]
    Substring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationRule {
    pub keyword: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeniorityRule {
    pub keywords: Vec<String>,
    pub years: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub skills: Vec<String>,
    /// Checked in order; the first keyword found decides the level.
    pub education: Vec<EducationRule>,
    pub education_match: MatchMode,
    /// Must capture the year count in group 1. Applied to lowercased text.
    pub experience_pattern: String,
    /// Substring fallbacks when no explicit year count is stated.
    pub seniority_fallbacks: Vec<SeniorityRule>,
}

const DEFAULT_SKILLS: &[&str] = &[
    "SQL", "Python", "R", "Excel", "Tableau", "Power BI", "SAS", "SPSS",
    "Java", "C#", "C++", "JavaScript", "Scala", "MATLAB", "Hadoop", "Spark",
    "AWS", "Azure", "Google Cloud", "ETL", "Machine Learning", "AI",
    "Deep Learning", "NLP", "Natural Language Processing", "Data Mining",
    "Data Visualization", "Statistical Analysis", "A/B Testing", "Data Modeling",
    "Data Warehousing", "Big Data", "NoSQL", "MongoDB", "Cassandra", "MySQL",
    "PostgreSQL", "Oracle", "SQL Server", "Teradata", "Snowflake", "Redshift",
    "Looker", "Qlik", "Alteryx", "KNIME", "RapidMiner", "TensorFlow", "PyTorch",
    "Keras", "scikit-learn", "pandas", "NumPy", "Matplotlib", "Seaborn", "ggplot2",
    "Jupyter", "Git", "Docker", "Kubernetes", "Airflow", "Luigi", "Databricks",
    "Agile", "Scrum", "Jira", "Confluence", "Microsoft Office", "VBA", "DAX",
    "Power Query", "SharePoint", "Salesforce", "Dynamics", "SAP", "Oracle EBS",
];

const DEFAULT_EDUCATION: &[(&str, &str)] = &[
    ("bachelor", "Bachelor's degree"),
    ("bs", "Bachelor's degree"),
    ("ba", "Bachelor's degree"),
    ("undergraduate", "Bachelor's degree"),
    ("master", "Master's degree"),
    ("ms", "Master's degree"),
    ("ma", "Master's degree"),
    ("graduate", "Master's degree"),
    ("phd", "PhD"),
    ("doctorate", "PhD"),
    ("doctoral", "PhD"),
    ("associate", "Associate's degree"),
    ("aa", "Associate's degree"),
    ("as", "Associate's degree"),
    ("high school", "High School Diploma"),
    ("ged", "High School Diploma"),
    ("certificate", "Certification"),
    ("certification", "Certification"),
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            skills: strings(DEFAULT_SKILLS),
            education: DEFAULT_EDUCATION
                .iter()
                .map(|(keyword, level)| EducationRule {
                    keyword: keyword.to_string(),
                    level: level.to_string(),
                })
                .collect(),
            education_match: MatchMode::Substring,
            experience_pattern: r"(\d+)(?:\+)?\s*(?:-\s*\d+)?\s*years?(?:\s+of)?\s+experience".to_string(),
            seniority_fallbacks: vec![
                SeniorityRule {
                    keywords: strings(&["senior", "sr."]),
                    years: 5,
                },
                SeniorityRule {
                    keywords: strings(&["mid", "intermediate"]),
                    years: 3,
                },
                SeniorityRule {
                    keywords: strings(&["junior", "jr.", "entry"]),
                    years: 1,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub senior_title_keywords: Vec<String>,
    pub junior_title_keywords: Vec<String>,
    pub senior_min_years: u32,
    pub junior_max_years: u32,
    /// avg/median above this ratio is "High".
    pub high_ratio: f64,
    /// avg/median below this ratio is "Low".
    pub low_ratio: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            senior_title_keywords: strings(&["senior", "sr", "lead", "principal"]),
            junior_title_keywords: strings(&["junior", "jr", "entry"]),
            senior_min_years: 5,
            junior_max_years: 1,
            high_ratio: 1.2,
            low_ratio: 0.8,
        }
    }
}
