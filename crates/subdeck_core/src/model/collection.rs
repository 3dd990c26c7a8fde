//! Deck, card and note records.
//!
//! # Invariants
//! - Ids are opaque and stable for the lifetime of the entity.
//! - A note's tag set never holds two tags differing only by case.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stable deck identifier.
pub type DeckId = i64;
/// Stable card identifier.
pub type CardId = i64;
/// Stable note identifier.
pub type NoteId = i64;

/// Deck id seeded by the initial schema. Never deletable.
pub const DEFAULT_DECK_ID: DeckId = 1;

/// One node of the deck forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    /// Full display path, e.g. `Lang::Vocab::Nouns`.
    pub path: String,
}

/// One card and its two foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    /// Home deck. Mutable through reassignment only.
    pub deck_id: DeckId,
    /// Template ordinal within the owning note.
    pub ord: i64,
}

/// Note with its tag set, loaded for tag mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub fields: String,
    pub tags: BTreeSet<String>,
}

impl Note {
    /// Returns whether the note carries `tag`, ignoring ASCII case.
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.tags.iter().any(|existing| existing.eq_ignore_ascii_case(tag))
    }

    /// Adds one tag with set semantics.
    ///
    /// Returns `true` only when the tag was not present before. Blank
    /// values are ignored.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.has_tag(tag) {
            return false;
        }
        self.tags.insert(tag.to_string())
    }
}
