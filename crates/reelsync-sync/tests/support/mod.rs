#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use reelsync_adapters::{MetadataSource, SourceError};
use reelsync_core::{
    AvailableFields, CanonicalRecord, DataSourceId, ExternalId, FieldKind, FieldValues, LiveField,
    LiveFieldSet, SchemaChange, TargetRecord,
};
use reelsync_storage::{FetchError, RecordStore, StoreError};
use reelsync_sync::{SyncEvent, SyncObserver};

pub fn location() -> DataSourceId {
    DataSourceId::new("ds-1")
}

pub fn live(entries: &[(&str, FieldKind)]) -> LiveFieldSet {
    entries
        .iter()
        .map(|(name, kind)| (name.to_string(), LiveField::new(kind.clone())))
        .collect()
}

pub fn target(id: &str, title: Option<&str>, url: Option<&str>) -> TargetRecord {
    TargetRecord {
        record_id: id.to_string(),
        title: title.map(str::to_string),
        external_reference_url: url.map(str::to_string),
    }
}

pub fn canonical(id: &str, title: &str) -> CanonicalRecord {
    CanonicalRecord {
        external_id: ExternalId::new(id),
        title: title.to_string(),
        primary_attribution: Some("Michael Mann".into()),
        secondary_attributions: Vec::new(),
        duration_minutes: Some(170.0),
        rating: None,
        description: Some("Thieves and cops.".into()),
        categories: vec!["Crime".into(), "Drama".into()],
        is_series: false,
    }
}

fn rejected(what: &str) -> StoreError {
    StoreError::Transport(FetchError::HttpStatus {
        status: 400,
        url: format!("https://api.notion.com/v1/{what}"),
        body: "validation_error".into(),
    })
}

/// In-memory database that applies schema changes and records every write.
#[derive(Default)]
pub struct FakeStore {
    pub fields: Mutex<LiveFieldSet>,
    pub candidates: Vec<TargetRecord>,
    pub fail_read: bool,
    pub fail_schema_write: bool,
    pub fail_query: bool,
    /// Record ids whose writes are rejected.
    pub reject_records: HashSet<String>,
    pub schema_writes: Mutex<Vec<Vec<SchemaChange>>>,
    pub record_writes: Mutex<Vec<(String, FieldValues)>>,
    pub queried_with: Mutex<Option<AvailableFields>>,
}

impl FakeStore {
    pub fn with_fields(fields: LiveFieldSet) -> Self {
        Self {
            fields: Mutex::new(fields),
            ..Self::default()
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.lock().unwrap().keys().cloned().collect()
    }

    pub fn schema_write_count(&self) -> usize {
        self.schema_writes.lock().unwrap().len()
    }

    pub fn record_writes(&self) -> Vec<(String, FieldValues)> {
        self.record_writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn read_fields(&self, _location: &DataSourceId) -> Result<LiveFieldSet, StoreError> {
        if self.fail_read {
            return Err(rejected("data_sources"));
        }
        Ok(self.fields.lock().unwrap().clone())
    }

    async fn write_fields(
        &self,
        _location: &DataSourceId,
        changes: &[SchemaChange],
    ) -> Result<(), StoreError> {
        self.schema_writes.lock().unwrap().push(changes.to_vec());
        if self.fail_schema_write {
            return Err(rejected("data_sources"));
        }
        let mut fields = self.fields.lock().unwrap();
        for change in changes {
            match change {
                SchemaChange::Rename { from, to } => {
                    if let Some(field) = fields.remove(from) {
                        fields.insert(to.clone(), field);
                    }
                }
                SchemaChange::Create(spec) => {
                    fields.insert(spec.name.to_string(), LiveField::new(spec.kind.clone()));
                }
            }
        }
        Ok(())
    }

    async fn query_candidates(
        &self,
        _location: &DataSourceId,
        available: &AvailableFields,
    ) -> Result<Vec<TargetRecord>, StoreError> {
        *self.queried_with.lock().unwrap() = Some(available.clone());
        if self.fail_query {
            return Err(rejected("query"));
        }
        Ok(self.candidates.clone())
    }

    async fn write_record(&self, record_id: &str, values: &FieldValues) -> Result<(), StoreError> {
        self.record_writes
            .lock()
            .unwrap()
            .push((record_id.to_string(), values.clone()));
        if self.reject_records.contains(record_id) {
            return Err(rejected("pages"));
        }
        Ok(())
    }
}

/// Canonical records by id and exact (case-insensitive) title; logs every call.
#[derive(Default)]
pub struct FakeSource {
    pub records: Vec<CanonicalRecord>,
    /// Ids or titles whose lookups fail with a transport error.
    pub unreachable: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn with_records(records: Vec<CanonicalRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check_reachable(&self, key: &str) -> Result<(), SourceError> {
        if self.unreachable.contains(key) {
            return Err(SourceError::Transport(FetchError::HttpStatus {
                status: 503,
                url: "https://www.omdbapi.com/".into(),
                body: "unavailable".into(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    fn source_id(&self) -> &'static str {
        "fake"
    }

    async fn fetch_by_id(&self, id: &ExternalId) -> Result<CanonicalRecord, SourceError> {
        self.calls.lock().unwrap().push(format!("id:{id}"));
        self.check_reachable(id.as_str())?;
        self.records
            .iter()
            .find(|r| &r.external_id == id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    async fn search_by_title(&self, title: &str) -> Result<CanonicalRecord, SourceError> {
        self.calls.lock().unwrap().push(format!("title:{title}"));
        self.check_reachable(title)?;
        self.records
            .iter()
            .find(|r| r.title.eq_ignore_ascii_case(title))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(title.to_string()))
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_event(&self, event: &SyncEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
