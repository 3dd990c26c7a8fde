//! Operator-facing maintenance surface.
//!
//! # Responsibility
//! - Validate one maintenance request before any store access.
//! - Run tagging and flattening through the serialized operation queue.
//! - Render outcomes as one-line success/failure/nothing-to-do reports.
//!
//! # Invariants
//! - Requests failing validation never reach the store.
//! - Tagging runs before flattening so tags record the original subdecks.
//! - Each action commits as its own single undoable batch.

use crate::repo::collection_repo::{CollectionStore, StoreResult};
use crate::service::flatten_service::{self, FlattenOutcome};
use crate::service::session::{BatchMutationFailure, OpQueue, OpResult, OpTicket};
use crate::service::tag_service::{self, TagOutcome, TagUpdate};
use rusqlite::Connection;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Preserve level offered when the operator does not pick one.
pub const DEFAULT_PRESERVE_LEVELS: u32 = 1;
/// Highest preserve level the operator may pick.
pub const MAX_PRESERVE_LEVELS: u32 = 10;

/// Requested maintenance on one root deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceRequest {
    pub root: String,
    pub tag: bool,
    pub flatten: bool,
    pub preserve_levels: u32,
}

impl MaintenanceRequest {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            tag: false,
            flatten: false,
            preserve_levels: DEFAULT_PRESERVE_LEVELS,
        }
    }

    /// Checks the request shape without touching the collection.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.root.trim().is_empty() {
            return Err(RequestError::EmptyRoot);
        }
        if !self.tag && !self.flatten {
            if self.preserve_levels != DEFAULT_PRESERVE_LEVELS {
                return Err(RequestError::ValidationMismatch {
                    preserve_levels: self.preserve_levels,
                });
            }
            return Err(RequestError::NothingRequested);
        }
        if self.preserve_levels > MAX_PRESERVE_LEVELS {
            return Err(RequestError::PreserveLevelOutOfRange {
                requested: self.preserve_levels,
                max: MAX_PRESERVE_LEVELS,
            });
        }
        Ok(())
    }
}

/// Request rejected before any mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Root deck path is blank.
    EmptyRoot,
    /// Neither tagging nor flattening was selected.
    NothingRequested,
    /// No action selected, yet a non-default preserve level was set.
    ValidationMismatch { preserve_levels: u32 },
    /// Preserve level exceeds the supported bound.
    PreserveLevelOutOfRange { requested: u32, max: u32 },
}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRoot => write!(f, "choose a root deck first"),
            Self::NothingRequested => {
                write!(f, "no action selected; choose tagging and/or flattening")
            }
            Self::ValidationMismatch { preserve_levels } => write!(
                f,
                "preserve level {preserve_levels} only applies to flattening; did you mean to flatten?"
            ),
            Self::PreserveLevelOutOfRange { requested, max } => {
                write!(f, "preserve level {requested} is above the maximum of {max}")
            }
        }
    }
}

impl Error for RequestError {}

/// Maintenance action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceAction {
    Tag,
    Flatten,
}

impl MaintenanceAction {
    fn gerund(self) -> &'static str {
        match self {
            Self::Tag => "tagging",
            Self::Flatten => "flattening",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Tag => "Tagging",
            Self::Flatten => "Flattening",
        }
    }
}

/// Outcome of one action, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MaintenanceReport {
    Succeeded {
        action: MaintenanceAction,
        root: String,
        summary: String,
        notices: Vec<String>,
    },
    NothingToDo {
        action: MaintenanceAction,
        root: String,
        reason: String,
    },
    Failed {
        action: MaintenanceAction,
        root: String,
        detail: String,
    },
}

impl MaintenanceReport {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Builds the report for a tagging run.
    pub fn from_tagging(root: &str, result: OpResult<TagOutcome>) -> Self {
        match result {
            Ok(success) => Self::Succeeded {
                action: MaintenanceAction::Tag,
                root: root.to_string(),
                summary: format!(
                    "tagged {} notes based on their cards' subdecks ({} new tags)",
                    success.value.notes_tagged, success.value.tags_added
                ),
                notices: Vec::new(),
            },
            Err(failure) => Self::failed(MaintenanceAction::Tag, root, &failure),
        }
    }

    /// Builds the report for a flattening run.
    pub fn from_flattening(root: &str, result: OpResult<FlattenOutcome>) -> Self {
        match result {
            Ok(success) if !success.value.root_found => Self::NothingToDo {
                action: MaintenanceAction::Flatten,
                root: root.to_string(),
                reason: "no matching deck found".to_string(),
            },
            Ok(success) => {
                let outcome = success.value;
                Self::Succeeded {
                    action: MaintenanceAction::Flatten,
                    root: outcome.root,
                    summary: format!(
                        "moved {} cards into {} decks, removed {} empty subdecks",
                        outcome.reassigned_count,
                        outcome.target_decks.len(),
                        outcome.deleted_deck_names.len()
                    ),
                    notices: outcome.preserved_notices,
                }
            }
            Err(failure) => Self::failed(MaintenanceAction::Flatten, root, &failure),
        }
    }

    fn failed(action: MaintenanceAction, root: &str, failure: &BatchMutationFailure) -> Self {
        Self::Failed {
            action,
            root: root.to_string(),
            detail: failure.cause.to_string(),
        }
    }
}

impl Display for MaintenanceReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded {
                action,
                root,
                summary,
                ..
            } => write!(
                f,
                "{} '{root}' completed: {summary}. Undo reverts it as one step.",
                action.title()
            ),
            Self::NothingToDo { root, reason, .. } => {
                write!(f, "Nothing to do for '{root}': {reason}.")
            }
            Self::Failed {
                action,
                root,
                detail,
            } => write!(f, "Error {} '{root}': {detail}", action.gerund()),
        }
    }
}

/// Maintenance facade over one collection.
///
/// Owns the serialized operation queue; every call goes through it.
pub struct Maintenance {
    queue: OpQueue,
}

impl Maintenance {
    /// Moves a migrated connection onto the background worker.
    pub fn new(conn: Connection) -> std::io::Result<Self> {
        Ok(Self {
            queue: OpQueue::spawn(conn)?,
        })
    }

    /// Lists every deck path, sorted.
    pub fn list_deck_paths(&self) -> Result<Vec<String>, BatchMutationFailure> {
        self.queue
            .submit("list_decks", |store| list_deck_paths(store))
            .wait()
            .map(|success| success.value)
    }

    /// Computes derived tag updates for notes under `root`.
    pub fn compute_tag_updates(&self, root: &str) -> OpTicket<Vec<TagUpdate>> {
        let root = root.to_string();
        self.queue.submit("compute_tags", move |store| {
            tag_service::compute_tag_updates(store, &root)
        })
    }

    /// Applies previously computed tag updates as one batch.
    pub fn apply_tag_updates(&self, updates: Vec<TagUpdate>) -> OpTicket<TagOutcome> {
        self.queue.submit("tag_notes", move |store| {
            tag_service::apply_tag_updates(store, &updates)
        })
    }

    /// Flattens `root` below `preserve_levels` as one batch.
    pub fn flatten(&self, root: &str, preserve_levels: u32) -> OpTicket<FlattenOutcome> {
        let root = root.to_string();
        self.queue.submit("flatten_deck", move |store| {
            flatten_service::flatten(store, &root, preserve_levels as usize)
        })
    }

    /// Validates and runs a full request, tagging first.
    ///
    /// Returns one report per requested action.
    pub fn run(
        &self,
        request: &MaintenanceRequest,
    ) -> Result<Vec<MaintenanceReport>, RequestError> {
        request.validate()?;
        let root = request.root.trim();
        let mut reports = Vec::new();

        if request.tag {
            reports.push(self.run_tagging(root));
        }
        if request.flatten {
            let result = self.flatten(root, request.preserve_levels).wait();
            reports.push(MaintenanceReport::from_flattening(root, result));
        }

        Ok(reports)
    }

    fn run_tagging(&self, root: &str) -> MaintenanceReport {
        let updates = match self.compute_tag_updates(root).wait() {
            Ok(success) => success.value,
            Err(failure) => {
                return MaintenanceReport::failed(MaintenanceAction::Tag, root, &failure);
            }
        };
        if updates.is_empty() {
            return MaintenanceReport::NothingToDo {
                action: MaintenanceAction::Tag,
                root: root.to_string(),
                reason: "no notes found to tag".to_string(),
            };
        }
        MaintenanceReport::from_tagging(root, self.apply_tag_updates(updates).wait())
    }
}

/// Lists sorted deck paths directly from a store.
pub fn list_deck_paths<S: CollectionStore>(store: &S) -> StoreResult<Vec<String>> {
    let mut paths: Vec<String> = store
        .list_decks()?
        .into_iter()
        .map(|deck| deck.path)
        .collect();
    paths.sort();
    Ok(paths)
}
