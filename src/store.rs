//! Memory Cell Store
//!
//! The indexed collection of memory cells. Each slot holds the current
//! committed payload in its serialized byte form; all access goes through a
//! single mutex, so reads always observe a complete, previously committed
//! payload.

use parking_lot::Mutex;

use crate::error::{StmError, StmResult};
use crate::types::CellIndex;

/// Indexed collection of memory cells.
///
/// Indices are assigned at creation, monotonically and gap-free, and never
/// change for the lifetime of the store.
pub struct CellStore {
    cells: Mutex<Vec<Vec<u8>>>,
}

impl CellStore {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(Vec::new()),
        }
    }

    /// Append a new cell holding `bytes`, returning its index.
    pub fn create(&self, bytes: Vec<u8>) -> CellIndex {
        let mut cells = self.cells.lock();
        let index = cells.len();
        cells.push(bytes);
        index
    }

    /// Current payload bytes of `index`, as a defensive copy.
    pub fn read_raw(&self, index: CellIndex) -> StmResult<Vec<u8>> {
        let cells = self.cells.lock();
        cells
            .get(index)
            .cloned()
            .ok_or(StmError::IndexOutOfRange(index))
    }

    /// Replace the payload of `index`.
    ///
    /// Only a committing transaction that owns `index` may call this.
    pub fn write_raw(&self, index: CellIndex, bytes: Vec<u8>) -> StmResult<()> {
        let mut cells = self.cells.lock();
        match cells.get_mut(index) {
            Some(slot) => {
                *slot = bytes;
                Ok(())
            }
            None => Err(StmError::IndexOutOfRange(index)),
        }
    }

    /// Compare-and-install step of a commit, as one critical section.
    ///
    /// Every `(index, snapshot)` pair in `expected` must still match the
    /// current payload byte-for-byte; if any differs, nothing is installed
    /// and `Ok(false)` is returned. Otherwise all `writes` are applied and
    /// become visible atomically. This is the commit linearization point.
    pub fn validate_and_install(
        &self,
        expected: &[(CellIndex, &[u8])],
        writes: Vec<(CellIndex, Vec<u8>)>,
    ) -> StmResult<bool> {
        let mut cells = self.cells.lock();

        for &(index, _) in &writes {
            if index >= cells.len() {
                return Err(StmError::IndexOutOfRange(index));
            }
        }
        for &(index, snapshot) in expected {
            let current = cells.get(index).ok_or(StmError::IndexOutOfRange(index))?;
            if current.as_slice() != snapshot {
                return Ok(false);
            }
        }
        for (index, bytes) in writes {
            cells[index] = bytes;
        }
        Ok(true)
    }

    /// Number of cells created so far.
    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.lock().is_empty()
    }

    /// Copy of every cell's bytes, for diagnostics.
    pub(crate) fn dump(&self) -> Vec<Vec<u8>> {
        self.cells.lock().clone()
    }
}

impl Default for CellStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_sequential() {
        let store = CellStore::new();
        assert_eq!(store.create(vec![1]), 0);
        assert_eq!(store.create(vec![2]), 1);
        assert_eq!(store.create(vec![3]), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_read_returns_copy() {
        let store = CellStore::new();
        let index = store.create(vec![1, 2, 3]);

        let mut copy = store.read_raw(index).unwrap();
        copy.push(4);

        assert_eq!(store.read_raw(index).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_write_replaces() {
        let store = CellStore::new();
        let index = store.create(vec![1]);
        store.write_raw(index, vec![9, 9]).unwrap();
        assert_eq!(store.read_raw(index).unwrap(), vec![9, 9]);
    }

    #[test]
    fn test_unknown_index_is_an_error() {
        let store = CellStore::new();
        assert_eq!(store.read_raw(5), Err(StmError::IndexOutOfRange(5)));
        assert_eq!(
            store.write_raw(5, vec![]),
            Err(StmError::IndexOutOfRange(5))
        );
    }

    #[test]
    fn test_validate_and_install_applies_on_match() {
        let store = CellStore::new();
        let a = store.create(vec![1]);
        let b = store.create(vec![2]);

        let snapshot = store.read_raw(a).unwrap();
        let installed = store
            .validate_and_install(&[(a, snapshot.as_slice())], vec![(b, vec![7])])
            .unwrap();

        assert!(installed);
        assert_eq!(store.read_raw(b).unwrap(), vec![7]);
    }

    #[test]
    fn test_validate_and_install_rejects_on_mismatch() {
        let store = CellStore::new();
        let a = store.create(vec![1]);
        let b = store.create(vec![2]);

        let stale = vec![0];
        let installed = store
            .validate_and_install(&[(a, stale.as_slice())], vec![(b, vec![7])])
            .unwrap();

        assert!(!installed);
        assert_eq!(store.read_raw(b).unwrap(), vec![2]);
    }

    #[test]
    fn test_validate_and_install_checks_write_bounds() {
        let store = CellStore::new();
        let a = store.create(vec![1]);
        let snapshot = store.read_raw(a).unwrap();

        let result = store.validate_and_install(&[(a, snapshot.as_slice())], vec![(9, vec![7])]);
        assert_eq!(result, Err(StmError::IndexOutOfRange(9)));
        assert_eq!(store.read_raw(a).unwrap(), vec![1]);
    }
}
