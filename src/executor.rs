//! Transaction Workers
//!
//! Drives the per-attempt state machine:
//!
//! scan -> acquire -> execute -> validate -> install -> commit
//!
//! Scan dry-runs the actions to discover the read and write sets. Acquire
//! claims the write set in ascending index order, fail-fast. Execute reruns
//! the actions for real. Validate and install happen in one critical
//! section of the cell store: every read-set member must still match its
//! snapshot byte-for-byte, then all staged payloads become visible at once.
//! Any conflict or action abort rolls the attempt back and retries after a
//! short backoff; codec and index errors are fatal and propagate.

use std::thread;
use std::time::Duration;

use crossbeam_utils::Backoff;
use log::{debug, trace};
use smallvec::SmallVec;

use crate::error::StmResult;
use crate::ownership::OwnershipTable;
use crate::store::CellStore;
use crate::transaction::{Mode, Transaction, TxContext, TxState};
use crate::types::CellIndex;

/// The shared memory substrate: cell payloads plus ownership slots. This is
/// the only shared mutable state in the runtime.
pub(crate) struct SharedState {
    pub(crate) cells: CellStore,
    pub(crate) ownership: OwnershipTable,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            cells: CellStore::new(),
            ownership: OwnershipTable::new(),
        }
    }
}

/// Retry pacing between failed attempts.
///
/// Purely a throughput knob: contended transactions spin briefly, then
/// sleep with exponential growth up to the cap.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// First sleep once spinning is exhausted, in microseconds.
    pub base_sleep_us: u64,
    /// Upper bound for the sleep between attempts, in microseconds.
    pub max_sleep_us: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_sleep_us: 50,
            max_sleep_us: 2_000,
        }
    }
}

/// Outcome of one attempt at running a transaction.
#[derive(Debug, PartialEq, Eq)]
enum Attempt {
    Committed,
    Retry,
}

/// Drive `tx` until it commits.
pub(crate) fn run_transaction(
    tx: &Transaction,
    shared: &SharedState,
    backoff: &BackoffConfig,
) -> StmResult<()> {
    let spin = Backoff::new();
    let mut sleep_us = backoff.base_sleep_us;

    loop {
        match run_attempt(tx, shared)? {
            Attempt::Committed => return Ok(()),
            Attempt::Retry => {
                trace!("{}: attempt rolled back, retrying", tx.name());
                if spin.is_completed() {
                    thread::sleep(Duration::from_micros(sleep_us));
                    sleep_us = sleep_us.saturating_mul(2).min(backoff.max_sleep_us);
                } else {
                    spin.snooze();
                }
            }
        }
    }
}

fn run_attempt(tx: &Transaction, shared: &SharedState) -> StmResult<Attempt> {
    let mut guard = tx.state.lock();
    let state = &mut *guard;
    state.begin_attempt(tx.seeds());

    // Scan: no shared state is touched, so an abort needs no release.
    match run_actions(tx, shared, state, Mode::Scan) {
        Ok(true) => {}
        Ok(false) => return Ok(rollback(tx, shared, state)),
        Err(err) => {
            rollback(tx, shared, state);
            return Err(err);
        }
    }

    // Acquire the write set in ascending index order, fail-fast.
    let mut order: SmallVec<[CellIndex; 8]> = state.write_set.iter().copied().collect();
    order.sort_unstable();
    if !shared.ownership.acquire_all(&order, tx.id()) {
        return Ok(rollback(tx, shared, state));
    }

    // Execute: rerun the actions against live cell state. Scan-phase
    // stagings are discarded first so each action's reads and writes land
    // in program order.
    state.staged.clear();
    match run_actions(tx, shared, state, Mode::Execute) {
        Ok(true) => {}
        Ok(false) => return Ok(rollback(tx, shared, state)),
        Err(err) => {
            rollback(tx, shared, state);
            return Err(err);
        }
    }

    // Install requires ownership of every write-set member to this point.
    if order
        .iter()
        .any(|&index| shared.ownership.owner_of(index) != Some(tx.id()))
    {
        return Ok(rollback(tx, shared, state));
    }

    // Validate + install in one critical section: read-set members that
    // are not also written must still match their snapshot byte-for-byte.
    let expected: Vec<(CellIndex, &[u8])> = state
        .read_set
        .iter()
        .filter(|&index| !state.write_set.contains(index))
        .filter_map(|index| {
            state
                .snapshot
                .get(index)
                .map(|bytes| (*index, bytes.as_slice()))
        })
        .collect();
    let writes: Vec<(CellIndex, Vec<u8>)> = order
        .iter()
        .filter_map(|&index| state.staged.get(&index).map(|bytes| (index, bytes.clone())))
        .collect();

    match shared.cells.validate_and_install(&expected, writes) {
        Ok(true) => {}
        Ok(false) => return Ok(rollback(tx, shared, state)),
        Err(err) => {
            rollback(tx, shared, state);
            return Err(err);
        }
    }

    for &index in &order {
        shared.ownership.release(index, tx.id());
    }

    state.committed = true;
    state.clear_sets();
    tx.record_commit();
    debug!("{}: committed, version {}", tx.name(), tx.version());
    Ok(Attempt::Committed)
}

fn run_actions(
    tx: &Transaction,
    shared: &SharedState,
    state: &mut TxState,
    mode: Mode,
) -> StmResult<bool> {
    for action in tx.actions() {
        let mut ctx = TxContext {
            mode,
            tx_id: tx.id(),
            state: &mut *state,
            store: &shared.cells,
            ownership: &shared.ownership,
        };
        if !action(&mut ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Abandon the current attempt: release held ownership and forget all
/// per-attempt state. Cell contents are never touched, because nothing is
/// installed before the commit point.
fn rollback(tx: &Transaction, shared: &SharedState, state: &mut TxState) -> Attempt {
    for &index in &state.write_set {
        shared.ownership.release(index, tx.id());
    }
    state.clear_sets();
    Attempt::Retry
}
