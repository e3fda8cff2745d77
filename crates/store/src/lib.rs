//! Persistence layer of the ledgerdoc engine: the ledger transaction
//! surface, an in-memory ledger, Mango selector evaluation, and the
//! versioned schema registry that stores and validates assets.

pub mod ledger;
pub mod memory;
pub mod registry;
pub mod schema;
pub mod selector;

pub use ledger::{composite_key, HistoryEntry, Ledger, LedgerStub, QueryPage};
pub use memory::{MemoryLedger, MemoryTx};
pub use registry::{AssetHistoryItem, Destination, Registry, RegistryItem};
