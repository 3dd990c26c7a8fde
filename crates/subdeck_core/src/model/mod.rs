//! Collection domain model.
//!
//! # Responsibility
//! - Define decks, cards and notes as read/written by the collection store.
//! - Own the deck path grammar shared by tagging and flattening.
//!
//! # Invariants
//! - Every card belongs to exactly one deck and one note.
//! - Deck paths are `::`-separated segment lists.

pub mod collection;
pub mod path;
