mod support;

use reelsync_core::{fields, required_schema, FieldKind, SchemaChange};
use reelsync_sync::{SchemaOutcome, SchemaReconciler, SyncEvent};
use support::{live, location, FakeStore, RecordingObserver};

#[tokio::test]
async fn second_reconciliation_is_a_no_op() {
    let store = FakeStore::with_fields(live(&[
        ("Name", FieldKind::Title),
        ("Notes", FieldKind::RichText),
    ]));
    let observer = RecordingObserver::default();
    let reconciler = SchemaReconciler::new(&store, &observer);

    let first = reconciler
        .ensure_schema(&location(), &required_schema())
        .await;
    assert_eq!(store.schema_write_count(), 1);

    let second = reconciler
        .ensure_schema(&location(), &required_schema())
        .await;
    assert_eq!(store.schema_write_count(), 1, "no write on the second pass");
    assert_eq!(first, second);
    assert!(observer.events().contains(&SyncEvent::SchemaUpToDate));
}

#[tokio::test]
async fn sole_title_field_is_renamed_not_duplicated() {
    let store = FakeStore::with_fields(live(&[("Name", FieldKind::Title)]));
    let observer = RecordingObserver::default();

    let outcome = SchemaReconciler::new(&store, &observer)
        .ensure_schema(&location(), &required_schema())
        .await;

    let writes = store.schema_writes.lock().unwrap().clone();
    assert_eq!(writes.len(), 1, "changes go out as one batch");
    let batch = &writes[0];
    assert!(batch.contains(&SchemaChange::Rename {
        from: "Name".into(),
        to: fields::TITLE.into(),
    }));
    assert!(!batch
        .iter()
        .any(|c| matches!(c, SchemaChange::Create(spec) if spec.name == fields::TITLE)));

    let titles = store
        .fields
        .lock()
        .unwrap()
        .values()
        .filter(|f| f.kind == FieldKind::Title)
        .count();
    assert_eq!(titles, 1);

    let available = outcome.capabilities();
    assert!(available.contains(fields::TITLE));
    assert!(available.tracks_status());
    assert!(observer.events().contains(&SyncEvent::TitleRenameQueued {
        from: "Name".into(),
        to: fields::TITLE.into(),
    }));
}

#[tokio::test]
async fn existing_fields_survive_reconciliation() {
    let store = FakeStore::with_fields(live(&[
        (fields::TITLE, FieldKind::Title),
        ("Watched", FieldKind::Other("checkbox".into())),
        (fields::GENRE, FieldKind::RichText),
    ]));
    let before = store.field_names();
    let observer = RecordingObserver::default();

    let outcome = SchemaReconciler::new(&store, &observer)
        .ensure_schema(&location(), &required_schema())
        .await;

    let after = store.field_names();
    let available = outcome.capabilities();
    for name in &before {
        assert!(after.contains(name), "{name} removed from the database");
        assert!(available.contains(name), "{name} missing from available set");
    }
    assert_eq!(
        store.fields.lock().unwrap()[fields::GENRE].kind,
        FieldKind::RichText,
        "existing field kept its type"
    );
}

#[tokio::test]
async fn read_failure_degrades_without_writing() {
    let store = FakeStore {
        fail_read: true,
        ..FakeStore::default()
    };
    let observer = RecordingObserver::default();

    let outcome = SchemaReconciler::new(&store, &observer)
        .ensure_schema(&location(), &required_schema())
        .await;

    assert!(outcome.is_degraded());
    assert!(outcome.capabilities().is_empty());
    assert_eq!(store.schema_write_count(), 0);
    assert!(observer
        .events()
        .iter()
        .any(|e| matches!(e, SyncEvent::SchemaDegraded { .. })));
}

#[tokio::test]
async fn write_failure_degrades() {
    let store = FakeStore {
        fail_schema_write: true,
        ..FakeStore::with_fields(live(&[("Name", FieldKind::Title)]))
    };
    let observer = RecordingObserver::default();

    let outcome = SchemaReconciler::new(&store, &observer)
        .ensure_schema(&location(), &required_schema())
        .await;

    match outcome {
        SchemaOutcome::Degraded { reason } => assert!(reason.contains("updating fields")),
        other => panic!("expected degraded, got {other:?}"),
    }
    assert_eq!(store.schema_write_count(), 1);
}
