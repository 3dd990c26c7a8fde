//! Deck hierarchy flattening.
//!
//! # Responsibility
//! - Move cards out of decks deeper than the preserved level into their
//!   ancestor at that level.
//! - Remove the emptied deep decks afterwards.
//!
//! # Invariants
//! - The root and decks at or above `preserve_levels` below it are never
//!   reassignment sources nor removal candidates.
//! - Every reassignment is applied before any emptiness check runs.
//! - Card counts are re-read right before each removal.
//! - One failed removal never aborts the remaining ones.

use crate::model::collection::{CardId, Deck, DeckId};
use crate::model::path;
use crate::repo::collection_repo::{CollectionStore, StoreResult};
use crate::service::index::descendant_decks;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Structured result of one flatten run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlattenOutcome {
    /// Root path as stored, or as requested when no deck matched.
    pub root: String,
    pub preserve_levels: usize,
    /// Whether a deck matched the requested root.
    pub root_found: bool,
    /// Cards whose home deck changed.
    pub reassigned_count: usize,
    /// Decks that received cards, sorted by path.
    pub target_decks: Vec<String>,
    /// Removed decks, deepest first.
    pub deleted_deck_names: Vec<String>,
    /// Candidates kept after cleanup, with the reason.
    pub preserved_notices: Vec<String>,
}

impl FlattenOutcome {
    /// Returns whether the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.reassigned_count == 0 && self.deleted_deck_names.is_empty()
    }
}

/// Card moves grouped by destination deck.
#[derive(Debug, Default)]
struct ReassignmentPlan {
    groups: BTreeMap<DeckId, Vec<CardId>>,
    target_paths: BTreeMap<DeckId, String>,
}

/// Flattens everything under `root` deeper than `preserve_levels`.
///
/// `preserve_levels` counts levels below the root: `0` collapses the whole
/// subtree into the root itself.
pub fn flatten<S: CollectionStore>(
    store: &S,
    root: &str,
    preserve_levels: usize,
) -> StoreResult<FlattenOutcome> {
    let Some((root_deck, descendants)) = descendant_decks(store, root)? else {
        log::info!("event=flatten module=flatten status=ok root_found=false");
        return Ok(FlattenOutcome {
            root: root.to_string(),
            preserve_levels,
            ..FlattenOutcome::default()
        });
    };

    let plan = plan_reassignment(store, &root_deck, &descendants, preserve_levels)?;

    let mut reassigned_count = 0;
    for (target_id, card_ids) in &plan.groups {
        reassigned_count += store.reassign_cards(card_ids, *target_id)?;
    }
    log::info!(
        "event=flatten_reassign module=flatten status=ok groups={} cards={}",
        plan.groups.len(),
        reassigned_count
    );

    let (deleted_deck_names, preserved_notices) =
        remove_empty_candidates(store, &root_deck, preserve_levels)?;

    let mut target_decks: Vec<String> = plan.target_paths.into_values().collect();
    target_decks.sort();

    Ok(FlattenOutcome {
        root: root_deck.path,
        preserve_levels,
        root_found: true,
        reassigned_count,
        target_decks,
        deleted_deck_names,
        preserved_notices,
    })
}

fn is_candidate(deck: &Deck, root: &Deck, preserve_levels: usize) -> bool {
    deck.id != root.id
        && path::relative_depth(&deck.path, &root.path)
            .is_some_and(|depth| depth > preserve_levels)
}

fn plan_reassignment<S: CollectionStore>(
    store: &S,
    root: &Deck,
    descendants: &[Deck],
    preserve_levels: usize,
) -> StoreResult<ReassignmentPlan> {
    let mut plan = ReassignmentPlan::default();
    let mut resolved: BTreeMap<String, DeckId> = BTreeMap::new();

    for deck in descendants {
        if !is_candidate(deck, root, preserve_levels) {
            continue;
        }

        let card_ids = store.list_card_ids_in(&BTreeSet::from([deck.id]))?;
        if card_ids.is_empty() {
            continue;
        }

        let target_path = path::flatten_target(&deck.path, &root.path, preserve_levels);
        let target_id = match resolved.get(&target_path) {
            Some(id) => *id,
            None => {
                let id = store.resolve_or_create_deck(&target_path)?;
                resolved.insert(target_path.clone(), id);
                id
            }
        };

        plan.groups.entry(target_id).or_default().extend(card_ids);
        plan.target_paths.entry(target_id).or_insert(target_path);
    }

    Ok(plan)
}

fn remove_empty_candidates<S: CollectionStore>(
    store: &S,
    root: &Deck,
    preserve_levels: usize,
) -> StoreResult<(Vec<String>, Vec<String>)> {
    // Re-read topology: reassignment may have created target decks.
    let mut candidates: Vec<Deck> = store
        .list_decks()?
        .into_iter()
        .filter(|deck| is_candidate(deck, root, preserve_levels))
        .collect();
    candidates.sort_by(|a, b| {
        path::depth(&b.path)
            .cmp(&path::depth(&a.path))
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut deleted = Vec::new();
    let mut notices = Vec::new();
    for deck in candidates {
        let count = store.card_count(deck.id)?;
        if count > 0 {
            notices.push(format!("{} kept: still holds {count} cards", deck.path));
            continue;
        }

        match store.delete_deck(deck.id) {
            Ok(()) => {
                log::debug!("event=deck_delete module=flatten status=ok deck_id={}", deck.id);
                deleted.push(deck.path);
            }
            Err(err) => {
                log::warn!(
                    "event=deck_delete module=flatten status=error deck_id={} error={}",
                    deck.id,
                    err
                );
                notices.push(format!("{} kept: {err}", deck.path));
            }
        }
    }

    log::info!(
        "event=flatten_cleanup module=flatten status=ok deleted={} kept={}",
        deleted.len(),
        notices.len()
    );
    Ok((deleted, notices))
}
