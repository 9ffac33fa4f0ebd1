//! Runtime Facade
//!
//! The entry point applications hold: creates cells, hands out transaction
//! builders, and dispatches parallel execution. Every transaction passed to
//! [`StmRuntime::exec`] gets its own worker thread; the call returns once
//! all of them have committed. [`StmRuntime::fork_exec`] does the same from
//! a detached background thread and reports worker failures on a
//! diagnostic channel instead of returning them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::info;

use crate::error::{StmError, StmResult};
use crate::executor::{run_transaction, BackoffConfig, SharedState};
use crate::ownership::TxId;
use crate::transaction::{Transaction, TransactionBuilder};
use crate::types::{decode, encode, CellIndex, CellRef, Payload};

/// Runtime configuration.
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// Retry pacing for contended transactions.
    pub backoff: BackoffConfig,
}

/// Worker outcome delivered on the diagnostic channel.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Name of the transaction whose worker failed.
    pub transaction: String,
    /// The fatal error that terminated the worker.
    pub error: StmError,
}

/// The software transactional memory runtime.
pub struct StmRuntime {
    shared: Arc<SharedState>,
    config: RuntimeConfig,
    next_tx_id: AtomicU64,
    reports: Sender<WorkerReport>,
    report_rx: Receiver<WorkerReport>,
}

impl StmRuntime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let (reports, report_rx) = unbounded();
        Self {
            shared: Arc::new(SharedState::new()),
            config,
            next_tx_id: AtomicU64::new(1),
            reports,
            report_rx,
        }
    }

    /// Create a memory cell holding `value`.
    ///
    /// The returned handle is only meaningful for this runtime.
    pub fn make_cell<T: Payload>(&self, value: &T) -> StmResult<CellRef<T>> {
        let bytes = encode(value)?;
        Ok(CellRef::new(self.shared.cells.create(bytes)))
    }

    /// Non-transactional read of a cell's committed payload, as a copy.
    ///
    /// For inspection and tests; transactional code reads through
    /// [`crate::TxContext::read`].
    pub fn read_cell<T: Payload>(&self, cell: &CellRef<T>) -> StmResult<T> {
        decode(&self.shared.cells.read_raw(cell.index())?)
    }

    /// Start building a transaction attached to this runtime.
    pub fn new_transaction(&self) -> TransactionBuilder {
        TransactionBuilder::new(self.next_tx_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Run every transaction to commit, one worker thread each.
    ///
    /// Blocks until all workers finish. The first fatal error is returned;
    /// every fatal error is also recorded on the diagnostic channel.
    pub fn exec(&self, txns: &[&Transaction]) -> StmResult<()> {
        let results: Vec<StmResult<()>> = thread::scope(|scope| {
            let handles: Vec<_> = txns
                .iter()
                .map(|&tx| {
                    scope.spawn(move || run_transaction(tx, &self.shared, &self.config.backoff))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => Err(StmError::WorkerPanicked(panic_message(panic))),
                })
                .collect()
        });

        let mut first_err = None;
        for (tx, result) in txns.iter().zip(results) {
            if let Err(error) = result {
                let _ = self.reports.send(WorkerReport {
                    transaction: tx.name().to_string(),
                    error: error.clone(),
                });
                if first_err.is_none() {
                    first_err = Some(error);
                }
            }
        }
        match first_err {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Run the transactions from a detached background worker set and
    /// return immediately.
    ///
    /// Worker failures surface through [`StmRuntime::try_report`].
    pub fn fork_exec(&self, txns: Vec<Arc<Transaction>>) {
        let shared = Arc::clone(&self.shared);
        let reports = self.reports.clone();
        let backoff = self.config.backoff.clone();

        thread::spawn(move || {
            thread::scope(|scope| {
                for tx in &txns {
                    let shared = &shared;
                    let reports = &reports;
                    let backoff = &backoff;
                    scope.spawn(move || {
                        if let Err(error) = run_transaction(tx, shared, backoff) {
                            let _ = reports.send(WorkerReport {
                                transaction: tx.name().to_string(),
                                error,
                            });
                        }
                    });
                }
            });
        });
    }

    /// Drain one worker report from the diagnostic channel, if any.
    pub fn try_report(&self) -> Option<WorkerReport> {
        self.report_rx.try_recv().ok()
    }

    /// Point-in-time view of the cell store and ownership table.
    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            cells: self
                .shared
                .cells
                .dump()
                .into_iter()
                .enumerate()
                .map(|(index, bytes)| CellSnapshot { index, bytes })
                .collect(),
            owners: self.shared.ownership.dump(),
        }
    }

    /// Log a diagnostic dump of the cell store and ownership table.
    pub fn display(&self) {
        info!("{}", self.snapshot());
    }
}

impl Default for StmRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One cell's bytes in a [`RuntimeSnapshot`].
#[derive(Debug, Clone)]
pub struct CellSnapshot {
    pub index: CellIndex,
    pub bytes: Vec<u8>,
}

/// Diagnostic view of the runtime's shared state.
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    pub cells: Vec<CellSnapshot>,
    pub owners: Vec<(CellIndex, TxId)>,
}

impl fmt::Display for RuntimeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "memory cells: {}", self.cells.len())?;
        for cell in &self.cells {
            write!(f, "  cell {}: {} bytes [", cell.index, cell.bytes.len())?;
            for (i, byte) in cell.bytes.iter().take(16).enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{byte:02x}")?;
            }
            if cell.bytes.len() > 16 {
                write!(f, " ..")?;
            }
            writeln!(f, "]")?;
        }
        writeln!(f, "owned cells: {}", self.owners.len())?;
        for &(index, owner) in &self.owners {
            writeln!(f, "  cell {index} -> tx {owner}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_cell_and_read_back() {
        let stm = StmRuntime::new();
        let cell = stm.make_cell(&vec![1i64, 2, 3]).unwrap();
        assert_eq!(stm.read_cell(&cell).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_cell_indices_are_per_runtime() {
        let stm = StmRuntime::new();
        let a = stm.make_cell(&0u8).unwrap();
        let b = stm.make_cell(&0u8).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn test_exec_commits_and_counts_versions() {
        let stm = StmRuntime::new();
        let cell = stm.make_cell(&0u64).unwrap();

        let tx = stm
            .new_transaction()
            .action(move |ctx| {
                let value: u64 = ctx.read(&cell)?;
                ctx.write(&cell, &(value + 1))
            })
            .named("increment")
            .build();

        for _ in 0..3 {
            stm.exec(&[&tx]).unwrap();
        }
        assert_eq!(stm.read_cell(&cell).unwrap(), 3);
        assert_eq!(tx.version(), 3);
    }

    #[test]
    fn test_foreign_handle_is_fatal_and_reported() {
        let stm = StmRuntime::new();
        let other = StmRuntime::new();
        other.make_cell(&1u64).unwrap();
        let foreign: CellRef<u64> = other.make_cell(&2u64).unwrap();

        let tx = stm
            .new_transaction()
            .action(move |ctx| {
                let _: u64 = ctx.read(&foreign)?;
                Ok(true)
            })
            .named("stray")
            .build();

        let result = stm.exec(&[&tx]);
        assert_eq!(result, Err(StmError::IndexOutOfRange(1)));

        let report = stm.try_report().unwrap();
        assert_eq!(report.transaction, "stray");
        assert_eq!(report.error, StmError::IndexOutOfRange(1));
        assert!(stm.try_report().is_none());
    }

    #[test]
    fn test_snapshot_lists_cells_and_owners() {
        let stm = StmRuntime::new();
        stm.make_cell(&7u8).unwrap();
        stm.make_cell(&8u8).unwrap();

        let snapshot = stm.snapshot();
        assert_eq!(snapshot.cells.len(), 2);
        assert!(snapshot.owners.is_empty());

        let rendered = snapshot.to_string();
        assert!(rendered.contains("memory cells: 2"));
        assert!(rendered.contains("cell 0"));
    }
}
