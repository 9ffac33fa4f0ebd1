//! Optimistic software transactional memory.
//!
//! Lets application code compose atomic operations over shared mutable
//! cells without manual locking. Transactions are optimistic: no locks are
//! held across user code, conflicts are detected at commit time and
//! resolved by rollback and retry.
//!
//! Key components:
//! - `types`: the value codec (payloads travel as borsh bytes) and typed
//!   cell handles
//! - `store`: the indexed cell store holding every committed payload
//! - `ownership`: per-cell write-intent slots with ordered, fail-fast
//!   acquisition
//! - `transaction`: the builder surface and the transactional read/write
//!   API handed to actions
//! - `executor`: workers driving scan, acquire, execute, validate, install
//! - `runtime`: the facade that creates cells and dispatches parallel
//!   execution
//!
//! Quick start:
//!
//! ```
//! use stm_runtime::StmRuntime;
//!
//! let stm = StmRuntime::new();
//! let account = stm.make_cell(&100i64).unwrap();
//!
//! let deposit = stm
//!     .new_transaction()
//!     .action(move |tx| {
//!         let balance: i64 = tx.read(&account)?;
//!         tx.write(&account, &(balance + 50))
//!     })
//!     .named("deposit")
//!     .build();
//!
//! stm.exec(&[&deposit]).unwrap();
//! assert_eq!(stm.read_cell(&account).unwrap(), 150);
//! assert_eq!(deposit.version(), 1);
//! ```

pub mod error;
pub mod executor;
pub mod ownership;
pub mod runtime;
pub mod store;
pub mod transaction;
pub mod types;

pub use error::*;
pub use executor::BackoffConfig;
pub use ownership::{AcquireOutcome, OwnershipTable, TxId};
pub use runtime::*;
pub use store::*;
pub use transaction::{ActionFn, Transaction, TransactionBuilder, TxContext};
pub use types::*;
