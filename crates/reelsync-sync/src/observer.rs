//! Structured events emitted by the reconciler and the pipeline.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::pipeline::SkipReason;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    SchemaRead {
        fields: Vec<String>,
    },
    TitleRenameQueued {
        from: String,
        to: String,
    },
    /// The existing title field cannot take the canonical name because another field holds it.
    TitleRenameBlocked {
        from: String,
        to: String,
    },
    SchemaUpdated {
        changes: Vec<String>,
    },
    SchemaUpToDate,
    SchemaDegraded {
        reason: String,
    },
    StatusTrackingDisabled,
    RunStarted {
        candidates: usize,
    },
    RecordStarted {
        record_id: String,
        label: String,
    },
    RecordUpdated {
        record_id: String,
        title: String,
    },
    RecordNotFound {
        record_id: String,
        label: String,
    },
    RecordSkipped {
        record_id: String,
        label: String,
        reason: SkipReason,
    },
    StatusWriteFailed {
        record_id: String,
        error: String,
    },
    RunFinished {
        updated: usize,
        not_found: usize,
        skipped: usize,
    },
}

/// Sink for [`SyncEvent`]s. The core never logs directly.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::SchemaRead { fields } => info!(?fields, "current fields"),
            SyncEvent::TitleRenameQueued { from, to } => {
                info!(%from, %to, "renaming title field")
            }
            SyncEvent::TitleRenameBlocked { from, to } => {
                warn!(%from, %to, "cannot rename title field, name already taken")
            }
            SyncEvent::SchemaUpdated { changes } => info!(?changes, "schema updated"),
            SyncEvent::SchemaUpToDate => info!("schema is up to date"),
            SyncEvent::SchemaDegraded { reason } => {
                warn!(%reason, "failed to ensure schema; optional fields disabled")
            }
            SyncEvent::StatusTrackingDisabled => warn!(
                "'Sync Status' field is missing; processed records will not be flagged. \
                 Add a 'Sync Status' select field to the database to enable it"
            ),
            SyncEvent::RunStarted { candidates: 0 } => info!("no entries found to update"),
            SyncEvent::RunStarted { candidates } => info!(candidates, "updating entries"),
            SyncEvent::RecordStarted { record_id, label } => {
                info!(%record_id, %label, "updating entry")
            }
            SyncEvent::RecordUpdated { record_id, title } => {
                info!(%record_id, %title, "updated entry")
            }
            SyncEvent::RecordNotFound { record_id, label } => {
                warn!(%record_id, %label, "no canonical record found")
            }
            SyncEvent::RecordSkipped {
                record_id,
                label,
                reason,
            } if reason.is_failure() => error!(%record_id, %label, %reason, "failed to update entry"),
            SyncEvent::RecordSkipped {
                record_id,
                label,
                reason,
            } => warn!(%record_id, %label, %reason, "skipped entry"),
            SyncEvent::StatusWriteFailed { record_id, error } => {
                error!(%record_id, %error, "failed to flag entry as not found")
            }
            SyncEvent::RunFinished {
                updated,
                not_found,
                skipped,
            } => info!(updated, not_found, skipped, "finished"),
        }
    }
}
