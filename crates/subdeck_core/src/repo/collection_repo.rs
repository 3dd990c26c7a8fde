//! Collection store contract and SQLite implementation.
//!
//! # Responsibility
//! - Read deck topology, card placement and note ownership.
//! - Rewrite card home decks in batches and remove emptied decks.
//! - Persist note tag sets.
//!
//! # Invariants
//! - Reassignment is a single-field update; a card is never left deckless.
//! - `delete_deck` re-checks card count and refuses non-empty decks.
//! - The seeded default deck and the current deck are never deleted.
//!
//! The store does not open transactions itself. Atomicity across a whole
//! unit of work is owned by `service::session`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::collection::{Card, CardId, Deck, DeckId, Note, NoteId, DEFAULT_DECK_ID};
use crate::model::path::{self, SEPARATOR};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Upper bound of ids bound into one `IN (...)` statement.
const IN_CLAUSE_CHUNK: usize = 500;
const CURRENT_DECK_KEY: &str = "current_deck";

pub type StoreResult<T> = Result<T, StoreError>;

/// Why a deck deletion was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckInUseReason {
    /// Seeded default deck.
    DefaultDeck,
    /// Deck selected as the collection's current deck.
    CurrentDeck,
    /// Deck still holds this many cards.
    HasCards(usize),
    /// Deck still has child decks.
    HasSubdecks,
}

impl Display for DeckInUseReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DefaultDeck => write!(f, "default deck"),
            Self::CurrentDeck => write!(f, "current deck"),
            Self::HasCards(count) => write!(f, "still holds {count} cards"),
            Self::HasSubdecks => write!(f, "still has subdecks"),
        }
    }
}

/// Errors from collection store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Deck id does not exist.
    DeckNotFound(DeckId),
    /// Deck exists but must not be deleted.
    DeckInUse {
        deck_id: DeckId,
        reason: DeckInUseReason,
    },
    /// Note id does not exist.
    NoteNotFound(NoteId),
    /// Deck path has an empty segment.
    InvalidPath(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::DeckNotFound(id) => write!(f, "deck not found: {id}"),
            Self::DeckInUse { deck_id, reason } => {
                write!(f, "deck {deck_id} is in use: {reason}")
            }
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::InvalidPath(value) => write!(f, "invalid deck path: `{value}`"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "collection store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "collection store requires table `{table}`")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Access surface over one deck collection.
pub trait CollectionStore {
    /// Lists every deck ordered by path.
    fn list_decks(&self) -> StoreResult<Vec<Deck>>;
    /// Looks up one deck by exact path.
    fn deck_by_path(&self, path: &str) -> StoreResult<Option<Deck>>;
    /// Returns the deck at `path`, creating it and any missing ancestors.
    fn resolve_or_create_deck(&self, path: &str) -> StoreResult<DeckId>;
    /// Lists ids of all cards homed in any of `deck_ids`.
    fn list_card_ids_in(&self, deck_ids: &BTreeSet<DeckId>) -> StoreResult<Vec<CardId>>;
    /// Returns the owning note of one card.
    fn note_id_for(&self, card_id: CardId) -> StoreResult<Option<NoteId>>;
    /// Returns the distinct owning notes of `card_ids`.
    fn note_ids_for(&self, card_ids: &[CardId]) -> StoreResult<BTreeSet<NoteId>>;
    /// Lists a note's cards ordered by template ordinal.
    fn cards_of(&self, note_id: NoteId) -> StoreResult<Vec<Card>>;
    /// Moves `card_ids` to `deck_id`. Returns the number of rows changed.
    fn reassign_cards(&self, card_ids: &[CardId], deck_id: DeckId) -> StoreResult<usize>;
    /// Counts cards currently homed in one deck.
    fn card_count(&self, deck_id: DeckId) -> StoreResult<usize>;
    /// Deletes one empty, unreferenced deck.
    fn delete_deck(&self, deck_id: DeckId) -> StoreResult<()>;
    /// Loads one note with its tag set.
    fn get_note(&self, note_id: NoteId) -> StoreResult<Note>;
    /// Writes the note's tag set back to storage.
    fn persist_note(&self, note: &Note) -> StoreResult<()>;
    /// Inserts one note and its initial tags.
    fn create_note(&self, fields: &str, tags: &[&str]) -> StoreResult<NoteId>;
    /// Inserts one card for `note_id` homed in `deck_id`.
    fn create_card(&self, note_id: NoteId, deck_id: DeckId) -> StoreResult<CardId>;
    /// Returns the collection's current deck.
    fn current_deck(&self) -> StoreResult<DeckId>;
    /// Selects the collection's current deck.
    fn set_current_deck(&self, deck_id: DeckId) -> StoreResult<()>;
}

/// SQLite-backed collection store.
///
/// Borrows a plain connection or a transaction (through `Deref`).
pub struct SqliteCollectionStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCollectionStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_collection_ready(conn)?;
        Ok(Self { conn })
    }

    fn deck_exists(&self, deck_id: DeckId) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM decks WHERE id = ?1);",
            [deck_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn deck_path(&self, deck_id: DeckId) -> StoreResult<String> {
        self.conn
            .query_row("SELECT name FROM decks WHERE id = ?1;", [deck_id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(StoreError::DeckNotFound(deck_id))
    }

    fn has_subdecks(&self, path: &str) -> StoreResult<bool> {
        let prefix = format!("{path}{SEPARATOR}");
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM decks
                WHERE substr(name, 1, length(?1)) = ?1 COLLATE NOCASE
            );",
            [prefix.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl CollectionStore for SqliteCollectionStore<'_> {
    fn list_decks(&self) -> StoreResult<Vec<Deck>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM decks ORDER BY name COLLATE NOCASE ASC, id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut decks = Vec::new();
        while let Some(row) = rows.next()? {
            decks.push(parse_deck_row(row)?);
        }
        Ok(decks)
    }

    fn deck_by_path(&self, path: &str) -> StoreResult<Option<Deck>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM decks WHERE name = ?1;")?;
        let mut rows = stmt.query([path])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_deck_row(row)?));
        }
        Ok(None)
    }

    fn resolve_or_create_deck(&self, path: &str) -> StoreResult<DeckId> {
        let parts = path::segments(path);
        if parts.iter().any(|segment| segment.trim().is_empty()) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        // New decks extend the stored spelling of their parent, so a
        // case-variant request never forks the hierarchy.
        let mut parent: Option<Deck> = None;
        for (depth, segment) in parts.iter().enumerate() {
            let wanted = match &parent {
                Some(parent) => path::join(&[parent.path.as_str(), segment]),
                None => (*segment).to_string(),
            };
            let deck = match self.deck_by_path(&wanted)? {
                Some(deck) => deck,
                None => {
                    self.conn
                        .execute("INSERT INTO decks (name) VALUES (?1);", [wanted.as_str()])?;
                    log::debug!("event=deck_create module=repo status=ok depth={depth}");
                    Deck {
                        id: self.conn.last_insert_rowid(),
                        path: wanted,
                    }
                }
            };
            parent = Some(deck);
        }

        parent
            .map(|deck| deck.id)
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))
    }

    fn list_card_ids_in(&self, deck_ids: &BTreeSet<DeckId>) -> StoreResult<Vec<CardId>> {
        let ids: Vec<DeckId> = deck_ids.iter().copied().collect();
        let mut card_ids = Vec::new();
        for chunk in ids.chunks(IN_CLAUSE_CHUNK) {
            let sql = format!(
                "SELECT id FROM cards WHERE did IN ({}) ORDER BY id ASC;",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(chunk))?;
            while let Some(row) = rows.next()? {
                card_ids.push(row.get(0)?);
            }
        }
        card_ids.sort_unstable();
        Ok(card_ids)
    }

    fn note_id_for(&self, card_id: CardId) -> StoreResult<Option<NoteId>> {
        let note_id = self
            .conn
            .query_row("SELECT nid FROM cards WHERE id = ?1;", [card_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(note_id)
    }

    fn note_ids_for(&self, card_ids: &[CardId]) -> StoreResult<BTreeSet<NoteId>> {
        let mut note_ids = BTreeSet::new();
        for chunk in card_ids.chunks(IN_CLAUSE_CHUNK) {
            let sql = format!(
                "SELECT DISTINCT nid FROM cards WHERE id IN ({});",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(chunk))?;
            while let Some(row) = rows.next()? {
                note_ids.insert(row.get(0)?);
            }
        }
        Ok(note_ids)
    }

    fn cards_of(&self, note_id: NoteId) -> StoreResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, nid, did, ord
             FROM cards
             WHERE nid = ?1
             ORDER BY ord ASC, id ASC;",
        )?;
        let mut rows = stmt.query([note_id])?;
        let mut cards = Vec::new();
        while let Some(row) = rows.next()? {
            cards.push(Card {
                id: row.get("id")?,
                note_id: row.get("nid")?,
                deck_id: row.get("did")?,
                ord: row.get("ord")?,
            });
        }
        Ok(cards)
    }

    fn reassign_cards(&self, card_ids: &[CardId], deck_id: DeckId) -> StoreResult<usize> {
        if !self.deck_exists(deck_id)? {
            return Err(StoreError::DeckNotFound(deck_id));
        }

        let mut changed = 0;
        for chunk in card_ids.chunks(IN_CLAUSE_CHUNK) {
            let sql = format!(
                "UPDATE cards SET did = ? WHERE id IN ({});",
                placeholders(chunk.len())
            );
            let bind = std::iter::once(&deck_id).chain(chunk.iter());
            changed += self.conn.execute(&sql, params_from_iter(bind))?;
        }
        Ok(changed)
    }

    fn card_count(&self, deck_id: DeckId) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE did = ?1;",
            [deck_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn delete_deck(&self, deck_id: DeckId) -> StoreResult<()> {
        let path = self.deck_path(deck_id)?;

        let refusal = if deck_id == DEFAULT_DECK_ID {
            Some(DeckInUseReason::DefaultDeck)
        } else if self.current_deck()? == deck_id {
            Some(DeckInUseReason::CurrentDeck)
        } else {
            match self.card_count(deck_id)? {
                0 if self.has_subdecks(&path)? => Some(DeckInUseReason::HasSubdecks),
                0 => None,
                count => Some(DeckInUseReason::HasCards(count)),
            }
        };
        if let Some(reason) = refusal {
            return Err(StoreError::DeckInUse { deck_id, reason });
        }

        self.conn
            .execute("DELETE FROM decks WHERE id = ?1;", [deck_id])?;
        Ok(())
    }

    fn get_note(&self, note_id: NoteId) -> StoreResult<Note> {
        let fields: String = self
            .conn
            .query_row("SELECT fields FROM notes WHERE id = ?1;", [note_id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(StoreError::NoteNotFound(note_id))?;

        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM note_tags WHERE nid = ?1 ORDER BY tag ASC;")?;
        let mut rows = stmt.query([note_id])?;
        let mut tags = BTreeSet::new();
        while let Some(row) = rows.next()? {
            tags.insert(row.get::<_, String>(0)?);
        }

        Ok(Note {
            id: note_id,
            fields,
            tags,
        })
    }

    fn persist_note(&self, note: &Note) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET fields = ?2,
                 mod = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![note.id, note.fields.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NoteNotFound(note.id));
        }

        self.conn
            .execute("DELETE FROM note_tags WHERE nid = ?1;", [note.id])?;
        for tag in &note.tags {
            self.conn.execute(
                "INSERT OR IGNORE INTO note_tags (nid, tag) VALUES (?1, ?2);",
                params![note.id, tag.as_str()],
            )?;
        }
        Ok(())
    }

    fn create_note(&self, fields: &str, tags: &[&str]) -> StoreResult<NoteId> {
        self.conn
            .execute("INSERT INTO notes (fields) VALUES (?1);", [fields])?;
        let note_id = self.conn.last_insert_rowid();
        for tag in tags {
            let tag = tag.trim();
            if tag.is_empty() {
                continue;
            }
            self.conn.execute(
                "INSERT OR IGNORE INTO note_tags (nid, tag) VALUES (?1, ?2);",
                params![note_id, tag],
            )?;
        }
        Ok(note_id)
    }

    fn create_card(&self, note_id: NoteId, deck_id: DeckId) -> StoreResult<CardId> {
        if !self.deck_exists(deck_id)? {
            return Err(StoreError::DeckNotFound(deck_id));
        }
        let changed = self.conn.execute(
            "INSERT INTO cards (nid, did, ord)
             SELECT id, ?2, (SELECT COUNT(*) FROM cards WHERE nid = ?1)
             FROM notes
             WHERE id = ?1;",
            params![note_id, deck_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NoteNotFound(note_id));
        }
        Ok(self.conn.last_insert_rowid())
    }

    fn current_deck(&self) -> StoreResult<DeckId> {
        let deck_id: Option<DeckId> = self
            .conn
            .query_row(
                "SELECT value FROM col_config WHERE key = ?1;",
                [CURRENT_DECK_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(deck_id.unwrap_or(DEFAULT_DECK_ID))
    }

    fn set_current_deck(&self, deck_id: DeckId) -> StoreResult<()> {
        if !self.deck_exists(deck_id)? {
            return Err(StoreError::DeckNotFound(deck_id));
        }
        self.conn.execute(
            "INSERT INTO col_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![CURRENT_DECK_KEY, deck_id],
        )?;
        Ok(())
    }
}

fn parse_deck_row(row: &Row<'_>) -> StoreResult<Deck> {
    Ok(Deck {
        id: row.get("id")?,
        path: row.get("name")?,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn ensure_collection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["decks", "cards", "notes", "note_tags", "col_config"] {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
