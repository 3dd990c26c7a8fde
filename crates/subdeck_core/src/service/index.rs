//! Card/note index for one root deck.
//!
//! # Invariants
//! - The scope includes the root deck itself.
//! - An unknown root yields an empty scope, not an error.
//! - Deck-id filtering is one batched lookup.

use crate::model::collection::{CardId, Deck, DeckId, NoteId};
use crate::model::path;
use crate::repo::collection_repo::{CollectionStore, StoreResult};
use std::collections::{BTreeMap, BTreeSet};

/// Materialized universe affected by an operation on `root`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckScope {
    /// Stored root deck, `None` when no deck matched.
    pub root: Option<Deck>,
    /// Root and every descendant deck, keyed by id.
    pub decks: BTreeMap<DeckId, String>,
    /// Cards homed in any scoped deck.
    pub card_ids: Vec<CardId>,
    /// Distinct owners of `card_ids`.
    pub note_ids: BTreeSet<NoteId>,
}

impl DeckScope {
    /// Returns whether there is nothing under the root to act on.
    pub fn is_empty(&self) -> bool {
        self.note_ids.is_empty()
    }

    pub fn deck_path(&self, deck_id: DeckId) -> Option<&str> {
        self.decks.get(&deck_id).map(String::as_str)
    }
}

/// Returns the stored root deck and all of its strict descendants.
///
/// The root path is matched through the store, so the returned paths carry
/// the stored spelling.
pub fn descendant_decks<S: CollectionStore>(
    store: &S,
    root: &str,
) -> StoreResult<Option<(Deck, Vec<Deck>)>> {
    let Some(root_deck) = store.deck_by_path(root)? else {
        return Ok(None);
    };
    let descendants = store
        .list_decks()?
        .into_iter()
        .filter(|deck| deck.id != root_deck.id && path::is_descendant(&deck.path, &root_deck.path))
        .collect();
    Ok(Some((root_deck, descendants)))
}

/// Resolves decks, cards and notes under `root`.
pub fn resolve_scope<S: CollectionStore>(store: &S, root: &str) -> StoreResult<DeckScope> {
    let Some((root_deck, descendants)) = descendant_decks(store, root)? else {
        log::info!("event=scope_resolve module=index status=ok root_found=false");
        return Ok(DeckScope::default());
    };

    let mut decks = BTreeMap::new();
    decks.insert(root_deck.id, root_deck.path.clone());
    for deck in descendants {
        decks.insert(deck.id, deck.path);
    }

    let deck_ids: BTreeSet<DeckId> = decks.keys().copied().collect();
    let card_ids = store.list_card_ids_in(&deck_ids)?;
    let note_ids = if card_ids.is_empty() {
        BTreeSet::new()
    } else {
        store.note_ids_for(&card_ids)?
    };

    log::info!(
        "event=scope_resolve module=index status=ok root_found=true decks={} cards={} notes={}",
        decks.len(),
        card_ids.len(),
        note_ids.len()
    );

    Ok(DeckScope {
        root: Some(root_deck),
        decks,
        card_ids,
        note_ids,
    })
}
