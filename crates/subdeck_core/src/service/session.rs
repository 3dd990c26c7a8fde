//! Batch mutation sessions.
//!
//! # Responsibility
//! - Run one unit of work against the collection as a single transaction.
//! - Serialize all units of work through one background worker.
//! - Report success with the work's value, or failure with the error detail.
//!
//! # Invariants
//! - A unit of work is either fully committed or fully rolled back.
//! - At most one unit of work touches the collection at any time.
//! - Work cannot be cancelled once submitted.

use crate::repo::collection_repo::{SqliteCollectionStore, StoreError, StoreResult};
use log::{error, info};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Instant;
use uuid::Uuid;

/// Correlation id of one unit of work.
pub type OpId = Uuid;

/// Committed unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpSuccess<T> {
    pub op_id: OpId,
    pub label: &'static str,
    pub value: T,
}

/// Why a unit of work did not commit.
#[derive(Debug)]
pub enum SessionError {
    /// The store rejected the work; everything was rolled back.
    Store(StoreError),
    /// The background worker is gone and cannot accept or answer work.
    WorkerUnavailable,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::WorkerUnavailable => write!(f, "collection worker is not running"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::WorkerUnavailable => None,
        }
    }
}

/// Rolled-back unit of work.
#[derive(Debug)]
pub struct BatchMutationFailure {
    pub op_id: OpId,
    pub label: &'static str,
    pub cause: SessionError,
}

impl Display for BatchMutationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.label, self.cause)
    }
}

impl Error for BatchMutationFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

pub type OpResult<T> = Result<OpSuccess<T>, BatchMutationFailure>;

/// Runs units of work on a borrowed connection, one transaction each.
pub struct BatchSession<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> BatchSession<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Runs `work` inside an immediate transaction.
    ///
    /// Commits when `work` returns `Ok`; rolls back otherwise.
    pub fn run<T, F>(&mut self, label: &'static str, work: F) -> OpResult<T>
    where
        F: FnOnce(&SqliteCollectionStore<'_>) -> StoreResult<T>,
    {
        let op_id = Uuid::new_v4();
        let started_at = Instant::now();
        info!("event=batch_op module=session status=start op={label} op_id={op_id}");

        match run_in_transaction(self.conn, work) {
            Ok(value) => {
                info!(
                    "event=batch_op module=session status=ok op={label} op_id={op_id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(OpSuccess {
                    op_id,
                    label,
                    value,
                })
            }
            Err(err) => {
                error!(
                    "event=batch_op module=session status=error op={label} op_id={op_id} duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(BatchMutationFailure {
                    op_id,
                    label,
                    cause: SessionError::Store(err),
                })
            }
        }
    }
}

fn run_in_transaction<T, F>(conn: &mut Connection, work: F) -> StoreResult<T>
where
    F: FnOnce(&SqliteCollectionStore<'_>) -> StoreResult<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = {
        let store = SqliteCollectionStore::try_new(&tx)?;
        work(&store)?
    };
    tx.commit()?;
    Ok(value)
}

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

/// Single background worker owning the collection connection.
///
/// Submitted work runs in submission order, one unit at a time. Dropping
/// the queue finishes pending work before the worker exits.
pub struct OpQueue {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl OpQueue {
    /// Moves `conn` onto a new worker thread.
    pub fn spawn(mut conn: Connection) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = std::thread::Builder::new()
            .name("subdeck-collection".to_string())
            .spawn(move || {
                for job in receiver {
                    job(&mut conn);
                }
                info!("event=op_queue module=session status=stopped");
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queues `work` and returns a ticket for its result.
    pub fn submit<T, F>(&self, label: &'static str, work: F) -> OpTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteCollectionStore<'_>) -> StoreResult<T> + Send + 'static,
    {
        let (result_tx, result_rx) = mpsc::channel();
        let job: Job = Box::new(move |conn| {
            let outcome = BatchSession::new(conn).run(label, work);
            // Receiver may be gone when the caller dropped its ticket.
            let _ = result_tx.send(outcome);
        });

        let queued = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(job).is_ok());
        if !queued {
            error!("event=op_submit module=session status=error op={label} error_code=worker_unavailable");
        }

        OpTicket {
            label,
            receiver: result_rx,
        }
    }
}

impl Drop for OpQueue {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("event=op_queue module=session status=error error_code=worker_panicked");
            }
        }
    }
}

/// Pending result of a submitted unit of work.
#[must_use = "a ticket carries the only report of the operation's outcome"]
pub struct OpTicket<T> {
    label: &'static str,
    receiver: Receiver<OpResult<T>>,
}

impl<T> OpTicket<T> {
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Blocks until the worker finished the work.
    pub fn wait(self) -> OpResult<T> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(worker_unavailable(self.label)))
    }

    /// Returns the result if the work already finished.
    pub fn try_result(&self) -> Option<OpResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(worker_unavailable(self.label))),
        }
    }
}

fn worker_unavailable(label: &'static str) -> BatchMutationFailure {
    BatchMutationFailure {
        op_id: Uuid::new_v4(),
        label,
        cause: SessionError::WorkerUnavailable,
    }
}
