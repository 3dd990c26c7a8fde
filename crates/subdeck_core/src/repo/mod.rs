//! Collection store contract and persistence implementation.
//!
//! # Responsibility
//! - Define the deck/card/note access surface the engines consume.
//! - Isolate SQLite query details from tagging and flattening logic.
//!
//! # Invariants
//! - Deck-id filters are resolved with batched `IN` lookups, never one
//!   round trip per card.
//! - A deck that still holds cards is never deleted.

pub mod collection_repo;
