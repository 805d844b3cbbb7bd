//! OMDb JSON API source.

use async_trait::async_trait;
use reelsync_core::{CanonicalRecord, ExternalId};
use reelsync_storage::{HttpFetcher, Method};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{best_title_match, MetadataSource, SourceError};

pub const OMDB_BASE_URL: &str = "https://www.omdbapi.com";

#[derive(Debug, Clone)]
pub struct OmdbConfig {
    pub base_url: String,
    pub api_key: String,
}

pub struct OmdbSource {
    http: HttpFetcher,
    config: OmdbConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OmdbTitle {
    pub title: String,
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub writer: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(rename = "imdbRating", default)]
    pub imdb_rating: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OmdbSearch {
    #[serde(default)]
    search: Vec<OmdbSearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OmdbSearchHit {
    title: String,
    #[serde(rename = "imdbID")]
    imdb_id: String,
}

impl OmdbSource {
    pub fn new(http: HttpFetcher, config: OmdbConfig) -> Self {
        Self { http, config }
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<JsonValue, SourceError> {
        let request = self
            .http
            .request(Method::GET, &format!("{}/", self.config.base_url.trim_end_matches('/')))
            .query(&[("apikey", self.config.api_key.as_str())])
            .query(params);
        Ok(self.http.send_json(request).await?)
    }

    async fn lookup_exact_title(&self, title: &str) -> Result<CanonicalRecord, SourceError> {
        let body = self.get(&[("t", title), ("plot", "full")]).await?;
        ensure_found(&body, title)?;
        decode_title(body)
    }
}

#[async_trait]
impl MetadataSource for OmdbSource {
    fn source_id(&self) -> &'static str {
        "omdb"
    }

    async fn fetch_by_id(&self, id: &ExternalId) -> Result<CanonicalRecord, SourceError> {
        let body = self.get(&[("i", id.as_str()), ("plot", "full")]).await?;
        ensure_found(&body, id.as_str())?;
        decode_title(body)
    }

    async fn search_by_title(&self, title: &str) -> Result<CanonicalRecord, SourceError> {
        let body = self.get(&[("s", title)]).await?;
        match ensure_found(&body, title) {
            Ok(()) => {}
            // "Too many results." and friends; an exact-title lookup may still hit.
            Err(SourceError::NotFound(_)) => {
                debug!(title, "search returned nothing, trying exact title lookup");
                return self.lookup_exact_title(title).await;
            }
            Err(err) => return Err(err),
        }

        let search: OmdbSearch =
            serde_json::from_value(body).map_err(|e| SourceError::Parse(e.to_string()))?;
        let (idx, score) = best_title_match(title, search.search.iter().map(|h| h.title.as_str()))
            .ok_or_else(|| SourceError::NotFound(format!("title '{title}'")))?;
        let hit = &search.search[idx];
        debug!(title, matched = %hit.title, id = %hit.imdb_id, score, "selected search hit");
        self.fetch_by_id(&ExternalId::new(hit.imdb_id.clone())).await
    }
}

/// OMDb reports misses as `200 {"Response": "False", "Error": "..."}`.
fn ensure_found(body: &JsonValue, what: &str) -> Result<(), SourceError> {
    match body.get("Response").and_then(JsonValue::as_str) {
        Some("True") => Ok(()),
        Some(_) => {
            let reason = body
                .get("Error")
                .and_then(JsonValue::as_str)
                .unwrap_or("not found");
            debug!(what, reason, "omdb miss");
            Err(SourceError::NotFound(what.to_string()))
        }
        None => Err(SourceError::Parse("missing Response flag".into())),
    }
}

fn decode_title(body: JsonValue) -> Result<CanonicalRecord, SourceError> {
    let title: OmdbTitle =
        serde_json::from_value(body).map_err(|e| SourceError::Parse(e.to_string()))?;
    Ok(title.into_canonical())
}

impl OmdbTitle {
    pub fn into_canonical(self) -> CanonicalRecord {
        let directors = split_names(self.director.as_deref());
        CanonicalRecord {
            external_id: ExternalId::new(self.imdb_id),
            title: self.title,
            primary_attribution: directors.into_iter().next(),
            secondary_attributions: split_names(self.writer.as_deref()),
            duration_minutes: present(self.runtime.as_deref()).and_then(parse_minutes),
            rating: present(self.imdb_rating.as_deref()).and_then(|r| r.parse().ok()),
            description: present(self.plot.as_deref()).map(str::to_string),
            categories: split_names(self.genre.as_deref()),
            is_series: self.kind.as_deref() == Some("series"),
        }
    }
}

/// OMDb uses the literal `N/A` for missing values.
fn present(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "N/A")
}

/// `"Vince Gilligan (creator), Peter Gould"` -> `["Vince Gilligan", "Peter Gould"]`.
fn split_names(value: Option<&str>) -> Vec<String> {
    let Some(value) = present(value) else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    for part in value.split(',') {
        let name = match part.find('(') {
            Some(idx) => &part[..idx],
            None => part,
        }
        .trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// `"142 min"` -> `142.0`.
fn parse_minutes(runtime: &str) -> Option<f64> {
    runtime
        .split_whitespace()
        .next()
        .and_then(|n| n.replace(',', "").parse::<f64>().ok())
}
