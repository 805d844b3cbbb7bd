//! Schema reconciliation and record update pipeline for reelsync.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reelsync_adapters::{FixtureCatalogSource, MetadataSource, OmdbConfig, OmdbSource};
use reelsync_core::{required_schema, DataSourceId};
use reelsync_storage::{
    HttpClientConfig, HttpFetcher, NotionConfig, NotionStore, RecordStore, TokenBucketConfig,
};
use tokio::fs;

pub mod mapper;
pub mod matcher;
pub mod observer;
pub mod pipeline;
pub mod schema;

pub use mapper::map_canonical;
pub use matcher::{resolve_identity, Identity};
pub use observer::{SyncEvent, SyncObserver, TracingObserver};
pub use pipeline::{RecordOutcome, RecordReport, SkipReason, SyncRunSummary, UpdatePipeline};
pub use schema::{plan_schema_changes, SchemaOutcome, SchemaPlan, SchemaReconciler};

pub const CRATE_NAME: &str = "reelsync-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub notion_token: Option<String>,
    pub database_url: Option<String>,
    pub database_name: Option<String>,
    pub notion_api_base: String,
    pub omdb_api_key: Option<String>,
    pub omdb_base_url: String,
    pub catalog_path: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub reports_dir: Option<PathBuf>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            notion_token: env_opt("NOTION_TOKEN"),
            database_url: env_opt("NOTION_DATABASE_URL"),
            database_name: env_opt("NOTION_DATABASE_NAME"),
            notion_api_base: env_opt("NOTION_API_BASE")
                .unwrap_or_else(|| reelsync_storage::notion::NOTION_API_BASE.to_string()),
            omdb_api_key: env_opt("OMDB_API_KEY"),
            omdb_base_url: env_opt("OMDB_BASE_URL")
                .unwrap_or_else(|| reelsync_adapters::omdb::OMDB_BASE_URL.to_string()),
            catalog_path: env_opt("REELSYNC_CATALOG_PATH").map(PathBuf::from),
            user_agent: env_opt("REELSYNC_USER_AGENT")
                .unwrap_or_else(|| "reelsync/0.1".to_string()),
            http_timeout_secs: env_opt("REELSYNC_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            reports_dir: env_opt("REELSYNC_REPORTS_DIR").map(PathBuf::from),
        }
    }

    fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            token_bucket: None,
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Notion client paced to its documented average of three requests per second.
pub fn build_store(config: &SyncConfig) -> Result<NotionStore> {
    let Some(token) = config.notion_token.clone() else {
        bail!("NOTION_TOKEN not found");
    };
    let http = HttpFetcher::new(HttpClientConfig {
        token_bucket: Some(TokenBucketConfig {
            capacity: 3,
            refill_every: Duration::from_millis(334),
        }),
        ..config.http_config()
    })?;
    Ok(NotionStore::new(
        http,
        NotionConfig {
            api_base: config.notion_api_base.clone(),
            token,
        },
    ))
}

/// Offline catalog when one is configured, OMDb otherwise.
pub fn build_source(config: &SyncConfig) -> Result<Box<dyn MetadataSource>> {
    if let Some(path) = &config.catalog_path {
        let catalog = FixtureCatalogSource::load(path)?;
        if catalog.is_empty() {
            bail!("catalog {} has no records", path.display());
        }
        tracing::info!(path = %path.display(), records = catalog.len(), "using offline catalog");
        return Ok(Box::new(catalog));
    }
    let Some(api_key) = config.omdb_api_key.clone() else {
        bail!("OMDB_API_KEY not found and no REELSYNC_CATALOG_PATH configured");
    };
    let http = HttpFetcher::new(config.http_config())?;
    Ok(Box::new(OmdbSource::new(
        http,
        OmdbConfig {
            base_url: config.omdb_base_url.clone(),
            api_key,
        },
    )))
}

pub async fn resolve_location(store: &NotionStore, config: &SyncConfig) -> Result<DataSourceId> {
    let found = store
        .resolve_location(config.database_url.as_deref(), config.database_name.as_deref())
        .await
        .context("resolving database location")?;
    match found {
        Some(id) => Ok(id),
        None => bail!("database could not be found; set NOTION_DATABASE_URL or NOTION_DATABASE_NAME"),
    }
}

/// Reconcile, query candidates, then update them. Only startup-phase failures are errors.
pub async fn run_sync(
    store: &dyn RecordStore,
    source: &dyn MetadataSource,
    location: &DataSourceId,
    observer: &dyn SyncObserver,
) -> Result<SyncRunSummary> {
    let outcome = SchemaReconciler::new(store, observer)
        .ensure_schema(location, &required_schema())
        .await;
    let available = outcome.capabilities();
    if !available.tracks_status() {
        observer.on_event(&SyncEvent::StatusTrackingDisabled);
    }

    let candidates = store
        .query_candidates(location, &available)
        .await
        .context("querying candidate records")?;

    Ok(UpdatePipeline::new(store, source, observer)
        .run(&candidates, &available)
        .await)
}

pub async fn run_sync_once(config: &SyncConfig, observer: &dyn SyncObserver) -> Result<SyncRunSummary> {
    let store = build_store(config)?;
    let location = resolve_location(&store, config).await?;
    let source = build_source(config)?;

    let summary = run_sync(&store, source.as_ref(), &location, observer).await?;

    if let Some(dir) = &config.reports_dir {
        let report_dir = write_reports(dir, &summary).await?;
        tracing::info!(path = %report_dir.display(), "wrote run report");
    }
    Ok(summary)
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    run_sync_once(&SyncConfig::from_env(), &TracingObserver).await
}

/// Reconcile the schema only.
pub async fn reconcile_schema_once(
    config: &SyncConfig,
    observer: &dyn SyncObserver,
) -> Result<(DataSourceId, SchemaOutcome)> {
    let store = build_store(config)?;
    let location = resolve_location(&store, config).await?;
    let outcome = SchemaReconciler::new(&store, observer)
        .ensure_schema(&location, &required_schema())
        .await;
    Ok((location, outcome))
}

/// Write `sync_report.json` and `summary.md` under `<root>/<run_id>/`.
pub async fn write_reports(root: &Path, summary: &SyncRunSummary) -> Result<PathBuf> {
    let report_dir = root.join(summary.run_id.to_string());
    fs::create_dir_all(&report_dir)
        .await
        .with_context(|| format!("creating {}", report_dir.display()))?;

    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(report_dir.join("sync_report.json"), json)
        .await
        .context("writing sync_report.json")?;

    fs::write(report_dir.join("summary.md"), summary_markdown(summary))
        .await
        .context("writing summary.md")?;

    Ok(report_dir)
}

pub fn summary_markdown(summary: &SyncRunSummary) -> String {
    let mut lines = vec![
        "# reelsync run".to_string(),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Source: {}", summary.source),
        format!("- Started: {}", summary.started_at),
        format!("- Finished: {}", summary.finished_at),
        format!("- Candidates: {}", summary.candidates),
        format!("- Updated: {}", summary.updated),
        format!("- Not found: {}", summary.not_found),
        format!("- Skipped: {}", summary.skipped),
    ];

    let attention: Vec<_> = summary
        .records
        .iter()
        .filter(|r| !matches!(r.outcome, RecordOutcome::Updated { .. }))
        .collect();
    if !attention.is_empty() {
        lines.push(String::new());
        lines.push("## Needs attention".to_string());
        for record in attention {
            let detail = match &record.outcome {
                RecordOutcome::NotFound => "not found".to_string(),
                RecordOutcome::Skipped { reason } => format!("skipped ({reason})"),
                RecordOutcome::Updated { .. } => continue,
            };
            lines.push(format!("- {} (`{}`): {}", record.label, record.record_id, detail));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}
