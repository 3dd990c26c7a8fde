//! Core logic for subdeck maintenance: deck-derived tagging and deck
//! hierarchy flattening over one flashcard collection.
//! This crate is the single source of truth for collection invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::collection::{Card, CardId, Deck, DeckId, Note, NoteId, DEFAULT_DECK_ID};
pub use repo::collection_repo::{
    CollectionStore, DeckInUseReason, SqliteCollectionStore, StoreError, StoreResult,
};
pub use service::flatten_service::{flatten, FlattenOutcome};
pub use service::index::{resolve_scope, DeckScope};
pub use service::maintenance::{
    list_deck_paths, Maintenance, MaintenanceAction, MaintenanceReport, MaintenanceRequest,
    RequestError, DEFAULT_PRESERVE_LEVELS, MAX_PRESERVE_LEVELS,
};
pub use service::session::{
    BatchMutationFailure, BatchSession, OpId, OpQueue, OpResult, OpSuccess, OpTicket,
    SessionError,
};
pub use service::tag_service::{apply_tag_updates, compute_tag_updates, TagOutcome, TagUpdate};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
