use std::fmt;
use std::marker::PhantomData;

/// Index of a cell in the runtime's memory vector.
pub type CellIndex = usize;

/// Typed handle to a memory cell.
///
/// A `CellRef` is a plain index into the cell store plus the payload type it
/// was created with; it carries no payload bytes and is freely copyable.
/// Handles are only meaningful for the runtime that created them.
pub struct CellRef<T> {
    index: CellIndex,
    _payload: PhantomData<fn() -> T>,
}

impl<T> CellRef<T> {
    pub(crate) fn new(index: CellIndex) -> Self {
        Self {
            index,
            _payload: PhantomData,
        }
    }

    /// Position of this cell in the runtime's memory vector.
    pub fn index(&self) -> CellIndex {
        self.index
    }
}

impl<T> Clone for CellRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CellRef<T> {}

impl<T> fmt::Debug for CellRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellRef").field(&self.index).finish()
    }
}
