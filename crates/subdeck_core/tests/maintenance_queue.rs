use std::collections::BTreeSet;
use std::path::Path;
use subdeck_core::db::open_db;
use subdeck_core::{
    CollectionStore, Maintenance, MaintenanceAction, MaintenanceReport, MaintenanceRequest,
    Note, RequestError, SessionError, SqliteCollectionStore, StoreError, TagUpdate,
};

fn seed(path: &Path) {
    let conn = open_db(path).unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    let nouns = store.resolve_or_create_deck("Lang::Vocab::Nouns").unwrap();
    let rare = store
        .resolve_or_create_deck("Lang::Vocab::Nouns::Rare")
        .unwrap();
    let other = store.resolve_or_create_deck("Other").unwrap();

    let spread = store.create_note("spread", &[]).unwrap();
    store.create_card(spread, nouns).unwrap();
    store.create_card(spread, rare).unwrap();
    let outside = store.create_note("outside", &[]).unwrap();
    store.create_card(outside, other).unwrap();
}

fn note_tags(path: &Path, fields: &str) -> BTreeSet<String> {
    let conn = open_db(path).unwrap();
    let note_id: i64 = conn
        .query_row("SELECT id FROM notes WHERE fields = ?1;", [fields], |row| {
            row.get(0)
        })
        .unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    store.get_note(note_id).unwrap().tags
}

#[test]
fn tagging_then_flattening_records_original_subdecks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collection.db");
    seed(&path);

    let reports = {
        let maintenance = Maintenance::new(open_db(&path).unwrap()).unwrap();
        let mut request = MaintenanceRequest::new("Lang::Vocab");
        request.tag = true;
        request.flatten = true;
        request.preserve_levels = 0;
        maintenance.run(&request).unwrap()
    };

    assert_eq!(reports.len(), 2);
    assert!(matches!(
        &reports[0],
        MaintenanceReport::Succeeded {
            action: MaintenanceAction::Tag,
            ..
        }
    ));
    assert!(matches!(
        &reports[1],
        MaintenanceReport::Succeeded {
            action: MaintenanceAction::Flatten,
            ..
        }
    ));
    let line = reports[1].to_string();
    assert!(line.starts_with("Flattening 'Lang::Vocab' completed:"));
    assert!(line.contains("one step"));

    assert_eq!(
        note_tags(&path, "spread"),
        BTreeSet::from([
            "Lang::Vocab::Nouns".to_string(),
            "Lang::Vocab::Nouns::Rare".to_string(),
        ])
    );
    assert!(note_tags(&path, "outside").is_empty());

    let conn = open_db(&path).unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    assert!(store.deck_by_path("Lang::Vocab::Nouns").unwrap().is_none());
    let root = store.deck_by_path("Lang::Vocab").unwrap().unwrap();
    assert_eq!(store.card_count(root.id).unwrap(), 2);
}

#[test]
fn invalid_request_is_rejected_before_touching_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collection.db");
    seed(&path);

    let maintenance = Maintenance::new(open_db(&path).unwrap()).unwrap();
    let mut request = MaintenanceRequest::new("Lang::Vocab");
    request.preserve_levels = 3;

    let err = maintenance.run(&request).unwrap_err();
    assert_eq!(err, RequestError::ValidationMismatch { preserve_levels: 3 });
    drop(maintenance);

    assert!(note_tags(&path, "spread").is_empty());
}

#[test]
fn unknown_root_reports_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collection.db");
    seed(&path);

    let maintenance = Maintenance::new(open_db(&path).unwrap()).unwrap();
    let mut request = MaintenanceRequest::new("Missing");
    request.tag = true;
    request.flatten = true;

    let reports = maintenance.run(&request).unwrap();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert!(matches!(report, MaintenanceReport::NothingToDo { .. }));
        assert!(report.to_string().starts_with("Nothing to do for 'Missing'"));
    }
}

#[test]
fn list_deck_paths_is_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collection.db");
    seed(&path);

    let maintenance = Maintenance::new(open_db(&path).unwrap()).unwrap();
    let paths = maintenance.list_deck_paths().unwrap();
    assert_eq!(
        paths,
        vec![
            "Default",
            "Lang",
            "Lang::Vocab",
            "Lang::Vocab::Nouns",
            "Lang::Vocab::Nouns::Rare",
            "Other",
        ]
    );
}

#[test]
fn failing_tag_batch_rolls_back_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collection.db");
    seed(&path);

    let result = {
        let maintenance = Maintenance::new(open_db(&path).unwrap()).unwrap();
        let mut updates = maintenance.compute_tag_updates("Lang").wait().unwrap().value;
        assert_eq!(updates.len(), 1);
        updates.push(TagUpdate {
            note: Note {
                id: 9_999,
                fields: String::new(),
                tags: BTreeSet::new(),
            },
            tags: BTreeSet::from(["Lang".to_string()]),
        });
        maintenance.apply_tag_updates(updates).wait()
    };

    let failure = result.unwrap_err();
    assert_eq!(failure.label, "tag_notes");
    assert!(matches!(
        failure.cause,
        SessionError::Store(StoreError::NoteNotFound(9_999))
    ));
    assert!(note_tags(&path, "spread").is_empty());

    let report = MaintenanceReport::from_tagging("Lang", Err(failure));
    assert!(report.is_failure());
    assert_eq!(report.to_string(), "Error tagging 'Lang': note not found: 9999");
}

#[test]
fn queued_operations_run_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collection.db");
    seed(&path);

    let maintenance = Maintenance::new(open_db(&path).unwrap()).unwrap();
    let flatten = maintenance.flatten("Lang", 0);
    let paths = maintenance.compute_tag_updates("Lang");

    let flattened = flatten.wait().unwrap().value;
    assert_eq!(flattened.reassigned_count, 2);

    let updates = paths.wait().unwrap().value;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].tags, BTreeSet::from(["Lang".to_string()]));
}

#[test]
fn reports_serialize_with_status_tag() {
    let report = MaintenanceReport::NothingToDo {
        action: MaintenanceAction::Flatten,
        root: "Lang".to_string(),
        reason: "no matching deck found".to_string(),
    };

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "status": "nothing_to_do",
            "action": "flatten",
            "root": "Lang",
            "reason": "no matching deck found",
        })
    );
}

#[test]
fn ticket_can_be_polled_until_work_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collection.db");
    seed(&path);

    let maintenance = Maintenance::new(open_db(&path).unwrap()).unwrap();
    let ticket = maintenance.flatten("Lang", 0);
    assert_eq!(ticket.label(), "flatten_deck");

    let result = loop {
        if let Some(result) = ticket.try_result() {
            break result;
        }
        std::thread::yield_now();
    };
    let success = result.unwrap();
    assert_eq!(success.label, "flatten_deck");
    assert_eq!(success.value.reassigned_count, 2);
}
