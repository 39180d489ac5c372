//! Left join of the detail collection with search-result enrichment.

use std::collections::{BTreeSet, HashMap, HashSet};

use ija_core::{is_missing, text_value, JoinKey, RawRecord};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledTable {
    /// Column rows are unique on, if any.
    pub key: Option<JoinKey>,
    /// True when the collections had no common key and search data was ignored.
    pub degraded: bool,
    pub rows: Vec<RawRecord>,
    pub matched_rows: usize,
    pub dropped_duplicates: usize,
    /// Rows without a key value; kept, never enriched or deduplicated.
    pub keyless_rows: usize,
}

fn exposes(records: &[RawRecord], column: &str) -> bool {
    records.iter().any(|r| r.contains_key(column))
}

/// First preferred key column exposed by both collections.
pub fn select_join_key(search: &[RawRecord], details: &[RawRecord]) -> Option<JoinKey> {
    JoinKey::PREFERENCE
        .into_iter()
        .find(|key| exposes(search, key.column()) && exposes(details, key.column()))
}

fn key_text(record: &RawRecord, key: JoinKey) -> Option<String> {
    let value = record.get(key.column());
    if is_missing(value) {
        return None;
    }
    value.and_then(text_value)
}

pub fn reconcile(search: &[RawRecord], details: Vec<RawRecord>) -> ReconciledTable {
    let join_key = select_join_key(search, &details);
    let (key, degraded) = match join_key {
        Some(key) => (Some(key), false),
        None => {
            let own_key = JoinKey::PREFERENCE
                .into_iter()
                .find(|key| exposes(&details, key.column()));
            warn!(
                dedup_key = ?own_key,
                "no common key between search results and job details; using job details only"
            );
            (own_key, true)
        }
    };

    let (search_index, search_columns) = match join_key {
        Some(key) => {
            let mut index: HashMap<String, &RawRecord> = HashMap::new();
            for record in search {
                if let Some(k) = key_text(record, key) {
                    index.entry(k).or_insert(record);
                }
            }
            let columns: BTreeSet<&str> = search
                .iter()
                .flat_map(|r| r.keys().map(String::as_str))
                .filter(|c| *c != key.column())
                .collect();
            (index, columns)
        }
        None => (HashMap::new(), BTreeSet::new()),
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut rows = Vec::with_capacity(details.len());
    let mut matched_rows = 0usize;
    let mut dropped_duplicates = 0usize;
    let mut keyless_rows = 0usize;

    for mut row in details {
        if let Some(key) = key {
            match key_text(&row, key) {
                Some(k) => {
                    if !seen.insert(k.clone()) {
                        dropped_duplicates += 1;
                        continue;
                    }
                    if join_key.is_some() {
                        let matched = search_index.get(&k).copied();
                        matched_rows += usize::from(matched.is_some());
                        enrich(&mut row, matched, &search_columns);
                    }
                }
                None => {
                    keyless_rows += 1;
                    if join_key.is_some() {
                        enrich(&mut row, None, &search_columns);
                    }
                }
            }
        }
        rows.push(row);
    }

    if keyless_rows > 0 {
        warn!(keyless_rows, key = ?key, "job details without a key value kept without enrichment");
    }
    info!(
        key = ?key,
        degraded,
        rows = rows.len(),
        matched_rows,
        dropped_duplicates,
        keyless_rows,
        "reconciled collections"
    );

    ReconciledTable {
        key,
        degraded,
        rows,
        matched_rows,
        dropped_duplicates,
        keyless_rows,
    }
}

/// Detail values win; missing detail values fall back to the search side.
/// Search-only columns are added, as null when there is no match.
fn enrich(row: &mut RawRecord, matched: Option<&RawRecord>, search_columns: &BTreeSet<&str>) {
    for &column in search_columns {
        let search_value = matched.and_then(|m| m.get(column));
        match row.get(column) {
            Some(current) if !is_missing(Some(current)) => {}
            Some(_) if is_missing(search_value) => {}
            _ => {
                row.insert(
                    column.to_string(),
                    search_value.cloned().unwrap_or(JsonValue::Null),
                );
            }
        }
    }
}
