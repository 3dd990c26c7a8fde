//! Collection maintenance services.
//!
//! # Responsibility
//! - Resolve the card/note universe under a root deck.
//! - Derive subdeck tags and flatten deep deck hierarchies.
//! - Run each mutation as one atomic batch and report its outcome.

pub mod flatten_service;
pub mod index;
pub mod maintenance;
pub mod session;
pub mod tag_service;
