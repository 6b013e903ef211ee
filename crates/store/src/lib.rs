//! On-disk knowledge base: per-version default snapshots, the shared
//! upgrade-logic set, the generation ledger and the rename table.

pub mod error;
pub mod io;
pub mod ledger;
pub mod lock;
pub mod paths;
pub mod store;

pub use error::{Result, StoreError};
pub use io::sha256_hex;
pub use ledger::{GenerationLedger, LedgerEntry};
pub use lock::StoreWriteLock;
pub use paths::resolve_kb_dir;
pub use store::{AppendOutcome, PutOutcome, VersionStore, WriteMode};
