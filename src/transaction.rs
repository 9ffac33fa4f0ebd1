//! Transactions and Their Authoring Surface
//!
//! A transaction is a reusable list of actions plus per-attempt
//! bookkeeping: the cells it read (read set), the cells it intends to write
//! (write set), the payloads staged for installation, and the snapshot of
//! every read used for commit-time validation.
//!
//! The same action list runs twice per attempt: once in scan mode, a dry
//! run that touches no shared state and only discovers the read and write
//! sets, then in execute mode once ownership of the write set is held.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::StmResult;
use crate::ownership::{OwnershipTable, TxId};
use crate::store::CellStore;
use crate::types::{decode, encode, CellIndex, CellRef, Payload};

/// One step of a transaction.
///
/// Returning `Ok(false)` aborts the current attempt; the transaction rolls
/// back and retries from scratch. Errors are fatal to the transaction.
pub type ActionFn = dyn Fn(&mut TxContext<'_>) -> StmResult<bool> + Send + Sync;

/// Which pass of the attempt is running an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Scan,
    Execute,
}

/// Per-attempt bookkeeping. Reset on rollback and cleared on commit.
#[derive(Default)]
pub(crate) struct TxState {
    /// True while the most recent run has committed.
    pub(crate) committed: bool,
    /// Cells read but not written.
    pub(crate) read_set: HashSet<CellIndex>,
    /// Cells this attempt intends to write.
    pub(crate) write_set: HashSet<CellIndex>,
    /// Payloads pending installation, by cell index.
    pub(crate) staged: HashMap<CellIndex, Vec<u8>>,
    /// Payload observed at first read, by cell index.
    pub(crate) snapshot: HashMap<CellIndex, Vec<u8>>,
    /// Transaction-local variables, invisible outside the transaction.
    pub(crate) locals: HashMap<String, Vec<u8>>,
}

impl TxState {
    /// Reset for a fresh attempt: sets cleared, locals back to the seeds.
    pub(crate) fn begin_attempt(&mut self, seeds: &HashMap<String, Vec<u8>>) {
        self.committed = false;
        self.clear_sets();
        self.locals = seeds.clone();
    }

    /// Forget all per-attempt knowledge. Never touches shared state.
    pub(crate) fn clear_sets(&mut self) {
        self.read_set.clear();
        self.write_set.clear();
        self.staged.clear();
        self.snapshot.clear();
    }
}

/// A reusable transaction handle.
///
/// Built once via [`TransactionBuilder`], then run any number of times;
/// each successful run increments [`Transaction::version`].
pub struct Transaction {
    id: TxId,
    name: String,
    actions: Vec<Box<ActionFn>>,
    seeds: HashMap<String, Vec<u8>>,
    pub(crate) state: Mutex<TxState>,
    commits: AtomicU64,
}

impl Transaction {
    /// Identifier of this transaction, unique within its runtime.
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of successful commits by this transaction object.
    pub fn version(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    /// True if the most recent run committed.
    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    pub(crate) fn actions(&self) -> &[Box<ActionFn>] {
        &self.actions
    }

    pub(crate) fn seeds(&self) -> &HashMap<String, Vec<u8>> {
        &self.seeds
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::AcqRel);
    }
}

/// Fluent builder for transactions.
pub struct TransactionBuilder {
    id: TxId,
    name: Option<String>,
    actions: Vec<Box<ActionFn>>,
    seeds: HashMap<String, Vec<u8>>,
}

impl TransactionBuilder {
    pub(crate) fn new(id: TxId) -> Self {
        Self {
            id,
            name: None,
            actions: Vec::new(),
            seeds: HashMap::new(),
        }
    }

    /// Seed a transaction-local variable visible to the actions.
    pub fn with_local<T: Payload>(mut self, name: impl Into<String>, value: &T) -> StmResult<Self> {
        self.seeds.insert(name.into(), encode(value)?);
        Ok(self)
    }

    /// Append an action to the transaction.
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut TxContext<'_>) -> StmResult<bool> + Send + Sync + 'static,
    {
        self.actions.push(Box::new(action));
        self
    }

    /// Name the transaction for diagnostics.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Finalize into a reusable transaction handle.
    pub fn build(self) -> Transaction {
        Transaction {
            name: self.name.unwrap_or_else(|| format!("tx-{}", self.id)),
            id: self.id,
            actions: self.actions,
            seeds: self.seeds,
            state: Mutex::new(TxState::default()),
            commits: AtomicU64::new(0),
        }
    }
}

/// The transactional API handed to actions.
pub struct TxContext<'a> {
    pub(crate) mode: Mode,
    pub(crate) tx_id: TxId,
    pub(crate) state: &'a mut TxState,
    pub(crate) store: &'a CellStore,
    pub(crate) ownership: &'a OwnershipTable,
}

impl TxContext<'_> {
    /// Transactional read: a decoded copy of the cell's payload.
    ///
    /// A pending write to the same cell shadows the committed value, so a
    /// write-then-read sequence observes the staged payload. In scan mode
    /// the first read of a cell records it into the read set and snapshots
    /// the observed bytes; later scan reads of the same cell serve the
    /// snapshot so one attempt observes a single value per cell.
    pub fn read<T: Payload>(&mut self, cell: &CellRef<T>) -> StmResult<T> {
        let index = cell.index();
        if let Some(bytes) = self.state.staged.get(&index) {
            return decode(bytes);
        }

        match self.mode {
            Mode::Scan => {
                if let Some(bytes) = self.state.snapshot.get(&index) {
                    return decode(bytes);
                }
                let bytes = self.store.read_raw(index)?;
                if !self.state.write_set.contains(&index) {
                    self.state.read_set.insert(index);
                }
                let value = decode(&bytes)?;
                self.state.snapshot.insert(index, bytes);
                Ok(value)
            }
            Mode::Execute => decode(&self.store.read_raw(index)?),
        }
    }

    /// Transactional write: stage `value` for installation at commit.
    ///
    /// In scan mode this only records write intent. In execute mode it
    /// verifies that the transaction still owns the cell and re-stages the
    /// payload so downstream actions see the latest pending value;
    /// `Ok(false)` means ownership was lost and the attempt must abort.
    pub fn write<T: Payload>(&mut self, cell: &CellRef<T>, value: &T) -> StmResult<bool> {
        let index = cell.index();
        let bytes = encode(value)?;

        match self.mode {
            Mode::Scan => {
                self.state.read_set.remove(&index);
                self.state.write_set.insert(index);
                self.state.staged.insert(index, bytes);
                Ok(true)
            }
            Mode::Execute => {
                if self.ownership.owner_of(index) != Some(self.tx_id) {
                    return Ok(false);
                }
                self.state.staged.insert(index, bytes);
                Ok(true)
            }
        }
    }

    /// Read a transaction-local variable.
    ///
    /// Locals reset to the builder seeds at the start of every attempt, so
    /// during scan only the seeds are visible.
    pub fn get_local<T: Payload>(&self, name: &str) -> StmResult<Option<T>> {
        match self.state.locals.get(name) {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a transaction-local variable.
    ///
    /// Deferred to a no-op during scan so that repeated scans of the same
    /// attempt stay idempotent.
    pub fn put_local<T: Payload>(&mut self, name: impl Into<String>, value: &T) -> StmResult<()> {
        if self.mode == Mode::Execute {
            self.state.locals.insert(name.into(), encode(value)?);
        }
        Ok(())
    }
}
