//! Subdeck tag synthesis.
//!
//! # Responsibility
//! - Derive one tag per scoped deck housing at least one of a note's cards.
//! - Union those tags into the stored tag set of each note.
//!
//! # Invariants
//! - Tags are only ever added, never removed or replaced.
//! - Re-applying the same updates adds nothing.
//! - Notes with no card left in scope are skipped.

use crate::model::collection::Note;
use crate::model::path;
use crate::repo::collection_repo::{CollectionStore, StoreResult};
use crate::service::index::resolve_scope;
use serde::Serialize;
use std::collections::BTreeSet;

/// Pending tag additions for one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUpdate {
    /// Note as loaded while computing the update.
    pub note: Note,
    /// Derived subdeck tags to add.
    pub tags: BTreeSet<String>,
}

/// Result of applying a batch of tag updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TagOutcome {
    /// Updates processed.
    pub notes_tagged: usize,
    /// Notes whose stored tag set actually grew.
    pub notes_changed: usize,
    /// Tags that were not present before.
    pub tags_added: usize,
}

/// Computes derived tags for every note with a card under `root`.
///
/// Returns updates ordered by note id. An unknown root yields no updates.
pub fn compute_tag_updates<S: CollectionStore>(
    store: &S,
    root: &str,
) -> StoreResult<Vec<TagUpdate>> {
    let scope = resolve_scope(store, root)?;
    let mut updates = Vec::new();

    for &note_id in &scope.note_ids {
        let tags: BTreeSet<String> = store
            .cards_of(note_id)?
            .iter()
            .filter_map(|card| scope.deck_path(card.deck_id))
            .map(path::to_tag)
            .collect();
        if tags.is_empty() {
            log::debug!("event=tag_compute module=tag status=skip note_id={note_id}");
            continue;
        }

        let note = store.get_note(note_id)?;
        updates.push(TagUpdate { note, tags });
    }

    log::info!(
        "event=tag_compute module=tag status=ok notes={} updates={}",
        scope.note_ids.len(),
        updates.len()
    );
    Ok(updates)
}

/// Adds each update's tags to the note's current tag set and persists it.
///
/// The note is re-read before the union so tags written since the update
/// was computed are kept.
pub fn apply_tag_updates<S: CollectionStore>(
    store: &S,
    updates: &[TagUpdate],
) -> StoreResult<TagOutcome> {
    let mut outcome = TagOutcome::default();

    for update in updates {
        let mut note = store.get_note(update.note.id)?;
        let mut added = 0;
        for tag in &update.tags {
            if note.add_tag(tag) {
                added += 1;
            }
        }

        outcome.notes_tagged += 1;
        if added > 0 {
            store.persist_note(&note)?;
            outcome.notes_changed += 1;
            outcome.tags_added += added;
        }
    }

    log::info!(
        "event=tag_apply module=tag status=ok notes={} changed={} tags_added={}",
        outcome.notes_tagged,
        outcome.notes_changed,
        outcome.tags_added
    );
    Ok(outcome)
}
