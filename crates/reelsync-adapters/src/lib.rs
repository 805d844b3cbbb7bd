//! Metadata-source contracts and the sources reelsync can pull canonical records from.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reelsync_core::{CanonicalRecord, ExternalId};
use reelsync_storage::FetchError;
use serde::de::DeserializeOwned;
use strsim::jaro_winkler;
use thiserror::Error;

pub mod omdb;

pub use omdb::{OmdbConfig, OmdbSource};

pub const CRATE_NAME: &str = "reelsync-adapters";

#[derive(Debug, Error)]
pub enum SourceError {
    /// The source has no matching item. Expected, not a transport failure.
    #[error("no canonical record for {0}")]
    NotFound(String),
    #[error("metadata source transport error: {0}")]
    Transport(#[from] FetchError),
    #[error("unexpected metadata payload: {0}")]
    Parse(String),
}

/// Read-only lookup of canonical records, by stable id or by free-text title.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_by_id(&self, id: &ExternalId) -> Result<CanonicalRecord, SourceError>;

    /// Best match for `title`; the selection policy belongs to the source.
    async fn search_by_title(&self, title: &str) -> Result<CanonicalRecord, SourceError>;
}

/// Lowercase, replace punctuation with spaces, collapse whitespace.
pub fn normalize_title(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Index and score of the candidate title closest to `query`. Ties keep the earlier candidate.
pub fn best_title_match<'a>(
    query: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<(usize, f64)> {
    let query = normalize_title(query);
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        let score = jaro_winkler(&query, &normalize_title(candidate));
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }
    best
}

/// Offline source backed by a JSON array of canonical records.
#[derive(Debug, Clone)]
pub struct FixtureCatalogSource {
    records: Vec<CanonicalRecord>,
}

impl FixtureCatalogSource {
    /// Title matches scoring below this are reported as not found.
    pub const MIN_SIMILARITY: f64 = 0.85;

    pub fn new(records: Vec<CanonicalRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let records: Vec<CanonicalRecord> = read_json_file(path)?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetadataSource for FixtureCatalogSource {
    fn source_id(&self) -> &'static str {
        "fixture-catalog"
    }

    async fn fetch_by_id(&self, id: &ExternalId) -> Result<CanonicalRecord, SourceError> {
        self.records
            .iter()
            .find(|record| &record.external_id == id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    async fn search_by_title(&self, title: &str) -> Result<CanonicalRecord, SourceError> {
        match best_title_match(title, self.records.iter().map(|r| r.title.as_str())) {
            Some((idx, score)) if score >= Self::MIN_SIMILARITY => Ok(self.records[idx].clone()),
            _ => Err(SourceError::NotFound(format!("title '{title}'"))),
        }
    }
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(id: &str, title: &str) -> CanonicalRecord {
        CanonicalRecord {
            external_id: ExternalId::new(id),
            title: title.to_string(),
            primary_attribution: None,
            secondary_attributions: Vec::new(),
            duration_minutes: None,
            rating: None,
            description: None,
            categories: Vec::new(),
            is_series: false,
        }
    }

    #[test]
    fn normalization_ignores_case_and_punctuation() {
        assert_eq!(normalize_title("  Léon: The   Professional! "), "léon the professional");
    }

    #[test]
    fn best_match_prefers_closest_and_keeps_first_on_ties() {
        let candidates = ["Heat Wave", "Heat", "Heat"];
        let (idx, score) = best_title_match("heat", candidates).expect("match");
        assert_eq!(idx, 1);
        assert!((score - 1.0).abs() < f64::EPSILON);
        assert!(best_title_match("heat", Vec::<&str>::new()).is_none());
    }

    #[tokio::test]
    async fn catalog_lookups_by_id_and_title() {
        let source = FixtureCatalogSource::new(vec![
            record("tt0113277", "Heat"),
            record("tt0306414", "The Wire"),
        ]);

        let by_id = source.fetch_by_id(&ExternalId::new("tt0306414")).await.expect("by id");
        assert_eq!(by_id.title, "The Wire");

        let by_title = source.search_by_title("the wire").await.expect("by title");
        assert_eq!(by_title.external_id.as_str(), "tt0306414");

        assert!(matches!(
            source.fetch_by_id(&ExternalId::new("tt9999999")).await,
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            source.search_by_title("Completely Unrelated Documentary").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn catalog_loads_from_disk_with_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"[{{"external_id": "tt0113277", "title": "Heat", "rating": 8.3}}]"#
        )
        .expect("write");

        let source = FixtureCatalogSource::load(file.path()).expect("load");
        assert_eq!(source.len(), 1);
        assert_eq!(source.records[0].rating, Some(8.3));
        assert!(source.records[0].categories.is_empty());
        assert!(!source.records[0].is_series);
    }
}
