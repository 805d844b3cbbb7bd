//! Additive schema reconciliation: rename the title field, create missing fields, never delete.

use std::collections::BTreeSet;

use reelsync_core::{AvailableFields, DataSourceId, FieldKind, FieldSpec, LiveFieldSet, SchemaChange};
use reelsync_storage::RecordStore;
use serde::Serialize;

use crate::observer::{SyncEvent, SyncObserver};

/// Result of [`SchemaReconciler::ensure_schema`].
///
/// `Degraded` is not "no fields": callers must treat every optional field as absent and keep going.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SchemaOutcome {
    Confirmed(AvailableFields),
    Degraded { reason: String },
}

impl SchemaOutcome {
    pub fn capabilities(&self) -> AvailableFields {
        match self {
            Self::Confirmed(available) => available.clone(),
            Self::Degraded { .. } => AvailableFields::empty(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Changes needed to bring a live field set into conformance, plus the resulting field names.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaPlan {
    pub changes: Vec<SchemaChange>,
    pub available: AvailableFields,
    pub blocked_rename: Option<(String, String)>,
}

pub fn plan_schema_changes(live: &LiveFieldSet, required: &[FieldSpec]) -> SchemaPlan {
    let mut view: BTreeSet<String> = live.keys().cloned().collect();
    let mut changes = Vec::new();
    let mut blocked_rename = None;

    let live_titles: Vec<&String> = live
        .iter()
        .filter(|(_, field)| field.kind == FieldKind::Title)
        .map(|(name, _)| name)
        .collect();
    let canonical_title = required
        .iter()
        .find(|spec| spec.kind == FieldKind::Title)
        .map(|spec| spec.name);

    if let (Some(canonical), [existing]) = (canonical_title, live_titles.as_slice()) {
        if existing.as_str() != canonical {
            if view.contains(canonical) {
                blocked_rename = Some((existing.to_string(), canonical.to_string()));
            } else {
                changes.push(SchemaChange::Rename {
                    from: existing.to_string(),
                    to: canonical.to_string(),
                });
                view.remove(existing.as_str());
                view.insert(canonical.to_string());
            }
        }
    }

    for spec in required {
        if view.insert(spec.name.to_string()) {
            changes.push(SchemaChange::Create(spec.clone()));
        }
    }

    SchemaPlan {
        changes,
        available: view.into_iter().collect(),
        blocked_rename,
    }
}

pub struct SchemaReconciler<'a> {
    store: &'a dyn RecordStore,
    observer: &'a dyn SyncObserver,
}

impl<'a> SchemaReconciler<'a> {
    pub fn new(store: &'a dyn RecordStore, observer: &'a dyn SyncObserver) -> Self {
        Self { store, observer }
    }

    /// Read the live fields, apply the additive plan in one batched write, report what exists.
    ///
    /// Read or write failures are reported as [`SchemaOutcome::Degraded`], never raised.
    pub async fn ensure_schema(
        &self,
        location: &DataSourceId,
        required: &[FieldSpec],
    ) -> SchemaOutcome {
        let live = match self.store.read_fields(location).await {
            Ok(live) => live,
            Err(err) => return self.degraded(format!("reading fields: {err}")),
        };
        self.observer.on_event(&SyncEvent::SchemaRead {
            fields: live.keys().cloned().collect(),
        });

        let plan = plan_schema_changes(&live, required);
        if let Some((from, to)) = &plan.blocked_rename {
            self.observer.on_event(&SyncEvent::TitleRenameBlocked {
                from: from.clone(),
                to: to.clone(),
            });
        }
        for change in &plan.changes {
            if let SchemaChange::Rename { from, to } = change {
                self.observer.on_event(&SyncEvent::TitleRenameQueued {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }

        if plan.changes.is_empty() {
            self.observer.on_event(&SyncEvent::SchemaUpToDate);
            return SchemaOutcome::Confirmed(plan.available);
        }

        if let Err(err) = self.store.write_fields(location, &plan.changes).await {
            return self.degraded(format!("updating fields: {err}"));
        }
        self.observer.on_event(&SyncEvent::SchemaUpdated {
            changes: plan.changes.iter().map(|c| c.key().to_string()).collect(),
        });
        SchemaOutcome::Confirmed(plan.available)
    }

    fn degraded(&self, reason: String) -> SchemaOutcome {
        self.observer.on_event(&SyncEvent::SchemaDegraded {
            reason: reason.clone(),
        });
        SchemaOutcome::Degraded { reason }
    }
}
