//! Ownership Table
//!
//! Maps each cell index to the transaction currently holding write intent
//! on it, or nothing. Purely a coordination structure: it holds no payload
//! bytes. At most one transaction owns a cell at any instant, and a
//! transaction either owns all cells of its write set or none.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smallvec::SmallVec;

use crate::types::CellIndex;

/// Identifier of a transaction, unique within a runtime.
pub type TxId = u64;

/// Outcome of a single acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The slot was free and is now held by the caller.
    Acquired,
    /// The caller already held the slot.
    AlreadyMine,
    /// Another transaction holds the slot.
    Conflict,
}

/// Per-cell write-intent slots.
pub struct OwnershipTable {
    slots: DashMap<CellIndex, TxId>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Try to take write intent on `index` for `owner`.
    pub fn try_acquire(&self, index: CellIndex, owner: TxId) -> AcquireOutcome {
        match self.slots.entry(index) {
            Entry::Occupied(entry) => {
                if *entry.get() == owner {
                    AcquireOutcome::AlreadyMine
                } else {
                    AcquireOutcome::Conflict
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(owner);
                AcquireOutcome::Acquired
            }
        }
    }

    /// Release `index` if it is held by `owner`; otherwise a no-op.
    pub fn release(&self, index: CellIndex, owner: TxId) {
        self.slots.remove_if(&index, |_, holder| *holder == owner);
    }

    /// Transaction currently holding `index`, if any.
    pub fn owner_of(&self, index: CellIndex) -> Option<TxId> {
        self.slots.get(&index).map(|entry| *entry.value())
    }

    /// Claim every index in `order` for `owner`, fail-fast.
    ///
    /// `order` must be sorted ascending: acquiring in a stable global order
    /// is what rules out deadlock between transactions with overlapping
    /// write sets. On the first conflict, everything taken in this call is
    /// released and `false` is returned.
    pub fn acquire_all(&self, order: &[CellIndex], owner: TxId) -> bool {
        debug_assert!(order.windows(2).all(|pair| pair[0] < pair[1]));

        let mut taken: SmallVec<[CellIndex; 8]> = SmallVec::new();
        for &index in order {
            match self.try_acquire(index, owner) {
                AcquireOutcome::Acquired => taken.push(index),
                AcquireOutcome::AlreadyMine => {}
                AcquireOutcome::Conflict => {
                    for &acquired in &taken {
                        self.release(acquired, owner);
                    }
                    return false;
                }
            }
        }
        true
    }

    /// Number of cells currently owned by some transaction.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current (index, owner) pairs in index order, for diagnostics.
    pub(crate) fn dump(&self) -> Vec<(CellIndex, TxId)> {
        let mut entries: Vec<_> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        entries.sort_unstable_by_key(|&(index, _)| index);
        entries
    }
}

impl Default for OwnershipTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_reacquire() {
        let table = OwnershipTable::new();

        assert_eq!(table.try_acquire(0, 1), AcquireOutcome::Acquired);
        assert_eq!(table.try_acquire(0, 1), AcquireOutcome::AlreadyMine);
        assert_eq!(table.try_acquire(0, 2), AcquireOutcome::Conflict);
        assert_eq!(table.owner_of(0), Some(1));
    }

    #[test]
    fn test_release_is_owner_checked() {
        let table = OwnershipTable::new();
        table.try_acquire(0, 1);

        table.release(0, 2);
        assert_eq!(table.owner_of(0), Some(1));

        table.release(0, 1);
        assert_eq!(table.owner_of(0), None);
    }

    #[test]
    fn test_acquire_all_takes_everything_or_nothing() {
        let table = OwnershipTable::new();
        table.try_acquire(2, 9);

        assert!(!table.acquire_all(&[0, 1, 2, 3], 1));
        assert_eq!(table.owner_of(0), None);
        assert_eq!(table.owner_of(1), None);
        assert_eq!(table.owner_of(2), Some(9));
        assert_eq!(table.owner_of(3), None);

        table.release(2, 9);
        assert!(table.acquire_all(&[0, 1, 2, 3], 1));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_empty_acquire_succeeds() {
        let table = OwnershipTable::new();
        assert!(table.acquire_all(&[], 1));
        assert!(table.is_empty());
    }
}
