use std::collections::BTreeSet;
use subdeck_core::db::open_db_in_memory;
use subdeck_core::{
    apply_tag_updates, compute_tag_updates, resolve_scope, CollectionStore, NoteId,
    SqliteCollectionStore,
};

fn note_with_cards(store: &SqliteCollectionStore<'_>, decks: &[&str], tags: &[&str]) -> NoteId {
    let note = store.create_note("front", tags).unwrap();
    for path in decks {
        let deck = store.resolve_or_create_deck(path).unwrap();
        store.create_card(note, deck).unwrap();
    }
    note
}

fn tag_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn note_spread_over_two_subdecks_gets_both_tags() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    let note = note_with_cards(&store, &["X::A", "X::B"], &[]);

    let updates = compute_tag_updates(&store, "X").unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].note.id, note);
    assert_eq!(updates[0].tags, tag_set(&["X::A", "X::B"]));
}

#[test]
fn notes_outside_root_are_excluded() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    let inside = note_with_cards(&store, &["Lang::Vocab"], &[]);
    note_with_cards(&store, &["Other::Deck"], &[]);
    note_with_cards(&store, &["Language::Deck"], &[]);

    let updates = compute_tag_updates(&store, "Lang").unwrap();
    let notes: Vec<NoteId> = updates.iter().map(|update| update.note.id).collect();
    assert_eq!(notes, vec![inside]);
}

#[test]
fn only_in_scope_decks_become_tags_and_spaces_become_underscores() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    note_with_cards(&store, &["My Deck::Sub Deck", "Elsewhere", "My Deck"], &[]);

    let updates = compute_tag_updates(&store, "My Deck").unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].tags, tag_set(&["My_Deck", "My_Deck::Sub_Deck"]));
}

#[test]
fn unknown_root_yields_no_updates() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    note_with_cards(&store, &["Lang::Vocab"], &[]);

    assert!(compute_tag_updates(&store, "Missing").unwrap().is_empty());
    assert!(resolve_scope(&store, "Missing").unwrap().is_empty());
}

#[test]
fn scope_resolves_decks_cards_and_notes() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    let first = note_with_cards(&store, &["Lang", "Lang::Vocab"], &[]);
    let second = note_with_cards(&store, &["Lang::Vocab::Nouns"], &[]);
    note_with_cards(&store, &["Other"], &[]);

    let scope = resolve_scope(&store, "Lang").unwrap();
    assert_eq!(scope.root.as_ref().map(|deck| deck.path.as_str()), Some("Lang"));
    assert_eq!(scope.decks.len(), 3);
    assert_eq!(scope.card_ids.len(), 3);
    assert_eq!(scope.note_ids, BTreeSet::from([first, second]));
}

#[test]
fn applying_updates_unions_with_existing_tags() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    let note = note_with_cards(&store, &["X::A"], &["manual"]);

    let updates = compute_tag_updates(&store, "X").unwrap();
    let outcome = apply_tag_updates(&store, &updates).unwrap();
    assert_eq!(outcome.notes_tagged, 1);
    assert_eq!(outcome.notes_changed, 1);
    assert_eq!(outcome.tags_added, 1);

    let stored = store.get_note(note).unwrap();
    assert_eq!(stored.tags, tag_set(&["X::A", "manual"]));
}

#[test]
fn applying_identical_updates_twice_adds_nothing() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    let note = note_with_cards(&store, &["X::A", "X::B"], &[]);

    let updates = compute_tag_updates(&store, "X").unwrap();
    apply_tag_updates(&store, &updates).unwrap();
    let after_first = store.get_note(note).unwrap().tags;

    let second = apply_tag_updates(&store, &updates).unwrap();
    let after_second = store.get_note(note).unwrap().tags;

    assert_eq!(second.tags_added, 0);
    assert_eq!(second.notes_changed, 0);
    assert_eq!(after_first, after_second);
    assert_eq!(after_second, tag_set(&["X::A", "X::B"]));
}

#[test]
fn existing_tag_differing_only_in_case_is_not_duplicated() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    let note = note_with_cards(&store, &["X::A"], &["x::a"]);

    let updates = compute_tag_updates(&store, "X").unwrap();
    let outcome = apply_tag_updates(&store, &updates).unwrap();
    assert_eq!(outcome.tags_added, 0);
    assert_eq!(store.get_note(note).unwrap().tags, tag_set(&["x::a"]));
}

#[test]
fn subdeck_created_with_other_case_is_tagged_with_stored_spelling() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCollectionStore::try_new(&conn).unwrap();
    store.resolve_or_create_deck("Lang::Vocab").unwrap();
    note_with_cards(&store, &["lang::vocab::Nouns"], &[]);

    let updates = compute_tag_updates(&store, "Lang::Vocab").unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].tags, tag_set(&["Lang::Vocab::Nouns"]));
}
