//! Per-record resolve -> fetch -> map -> write -> status sequence.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use reelsync_adapters::{MetadataSource, SourceError};
use reelsync_core::{fields, AvailableFields, CanonicalRecord, FieldValue, FieldValues, SyncStatus, TargetRecord};
use reelsync_storage::RecordStore;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::mapper::map_canonical;
use crate::matcher::{resolve_identity, Identity};
use crate::observer::{SyncEvent, SyncObserver};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record has no title or external url")]
    NoIdentity,
    #[error("no canonical record for {0}")]
    NotFound(String),
    #[error(transparent)]
    Source(SourceError),
}

impl From<SourceError> for RecordError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(what) => Self::NotFound(what),
            other => Self::Source(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    NoIdentity,
    /// Same record id already handled earlier in this run.
    Duplicate,
    FetchFailed(String),
    WriteFailed(String),
}

impl SkipReason {
    /// Transport or API failure, as opposed to a record that cannot be processed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FetchFailed(_) | Self::WriteFailed(_))
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoIdentity => f.write_str("no title or external url"),
            Self::Duplicate => f.write_str("already processed in this run"),
            Self::FetchFailed(err) => write!(f, "fetch failed: {err}"),
            Self::WriteFailed(err) => write!(f, "write failed: {err}"),
        }
    }
}

/// Terminal state of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Updated { title: String },
    NotFound,
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    pub record_id: String,
    pub label: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    /// Metadata source the run pulled from.
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub candidates: usize,
    pub updated: usize,
    pub not_found: usize,
    pub skipped: usize,
    pub records: Vec<RecordReport>,
}

pub struct UpdatePipeline<'a> {
    store: &'a dyn RecordStore,
    source: &'a dyn MetadataSource,
    observer: &'a dyn SyncObserver,
}

impl<'a> UpdatePipeline<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        source: &'a dyn MetadataSource,
        observer: &'a dyn SyncObserver,
    ) -> Self {
        Self {
            store,
            source,
            observer,
        }
    }

    /// Process candidates one at a time, in order. A failing record never stops the run.
    pub async fn run(
        &self,
        candidates: &[TargetRecord],
        available: &AvailableFields,
    ) -> SyncRunSummary {
        let started_at = Utc::now();
        self.observer.on_event(&SyncEvent::RunStarted {
            candidates: candidates.len(),
        });

        let mut seen: HashSet<&str> = HashSet::with_capacity(candidates.len());
        let mut records = Vec::with_capacity(candidates.len());
        for record in candidates {
            let outcome = if seen.insert(record.record_id.as_str()) {
                self.process_record(record, available).await
            } else {
                RecordOutcome::Skipped {
                    reason: SkipReason::Duplicate,
                }
            };
            self.report(record, &outcome);
            records.push(RecordReport {
                record_id: record.record_id.clone(),
                label: record.label().to_string(),
                outcome,
            });
        }

        let (mut updated, mut not_found, mut skipped) = (0, 0, 0);
        for report in &records {
            match report.outcome {
                RecordOutcome::Updated { .. } => updated += 1,
                RecordOutcome::NotFound => not_found += 1,
                RecordOutcome::Skipped { .. } => skipped += 1,
            }
        }
        self.observer.on_event(&SyncEvent::RunFinished {
            updated,
            not_found,
            skipped,
        });

        SyncRunSummary {
            run_id: Uuid::new_v4(),
            source: self.source.source_id().to_string(),
            started_at,
            finished_at: Utc::now(),
            candidates: candidates.len(),
            updated,
            not_found,
            skipped,
            records,
        }
    }

    pub async fn process_record(
        &self,
        record: &TargetRecord,
        available: &AvailableFields,
    ) -> RecordOutcome {
        let identity = resolve_identity(record);
        if identity == Identity::Unresolvable {
            return skipped(SkipReason::NoIdentity);
        }

        self.observer.on_event(&SyncEvent::RecordStarted {
            record_id: record.record_id.clone(),
            label: record.label().to_string(),
        });

        let canonical = match self.fetch_canonical(&identity).await {
            Ok(canonical) => canonical,
            Err(RecordError::NotFound(_)) => {
                self.flag_not_found(record, available).await;
                return RecordOutcome::NotFound;
            }
            Err(err) => return skipped(SkipReason::FetchFailed(err.to_string())),
        };

        let mut values = map_canonical(&canonical);
        if available.tracks_status() {
            values.insert(
                fields::SYNC_STATUS.to_string(),
                FieldValue::Select(SyncStatus::Updated.label().to_string()),
            );
        }

        match self.store.write_record(&record.record_id, &values).await {
            Ok(()) => RecordOutcome::Updated {
                title: canonical.title,
            },
            Err(err) => skipped(SkipReason::WriteFailed(err.to_string())),
        }
    }

    async fn fetch_canonical(&self, identity: &Identity) -> Result<CanonicalRecord, RecordError> {
        let canonical = match identity {
            Identity::ById(id) => self.source.fetch_by_id(id).await?,
            Identity::ByTitle(title) => self.source.search_by_title(title).await?,
            Identity::Unresolvable => return Err(RecordError::NoIdentity),
        };
        Ok(canonical)
    }

    /// Best effort: a failed status write is reported and the record still ends as not found.
    async fn flag_not_found(&self, record: &TargetRecord, available: &AvailableFields) {
        if !available.tracks_status() {
            return;
        }
        let mut values = FieldValues::new();
        values.insert(
            fields::SYNC_STATUS.to_string(),
            FieldValue::Select(SyncStatus::NotFound.label().to_string()),
        );
        if let Err(err) = self.store.write_record(&record.record_id, &values).await {
            self.observer.on_event(&SyncEvent::StatusWriteFailed {
                record_id: record.record_id.clone(),
                error: err.to_string(),
            });
        }
    }

    fn report(&self, record: &TargetRecord, outcome: &RecordOutcome) {
        let record_id = record.record_id.clone();
        let event = match outcome {
            RecordOutcome::Updated { title } => SyncEvent::RecordUpdated {
                record_id,
                title: title.clone(),
            },
            RecordOutcome::NotFound => SyncEvent::RecordNotFound {
                record_id,
                label: record.label().to_string(),
            },
            RecordOutcome::Skipped { reason } => SyncEvent::RecordSkipped {
                record_id,
                label: record.label().to_string(),
                reason: reason.clone(),
            },
        };
        self.observer.on_event(&event);
    }
}

fn skipped(reason: SkipReason) -> RecordOutcome {
    RecordOutcome::Skipped { reason }
}
