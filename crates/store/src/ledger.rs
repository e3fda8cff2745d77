//! The key/value ledger the engine persists into.
//!
//! [`LedgerStub`] is the narrow surface of a transaction on the host ledger:
//! point reads and writes on public state and on per-collection private
//! data, prefix scans, and rich queries. Writes become visible to other
//! transactions only after [`LedgerStub::commit`]; dropping a stub without
//! committing discards them.

use chrono::{DateTime, Utc};
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::query::Query;

/// Separator framing composite key parts.
const COMPOSITE_SEPARATOR: char = '\u{0}';

/// Key built from an object type and attributes: `\0TYPE\0attr\0...`.
pub fn composite_key(object_type: &str, attributes: &[&str]) -> String {
    let mut key = String::new();
    key.push(COMPOSITE_SEPARATOR);
    key.push_str(object_type);
    key.push(COMPOSITE_SEPARATOR);
    for attribute in attributes {
        key.push_str(attribute);
        key.push(COMPOSITE_SEPARATOR);
    }
    key
}

/// Composite key rendered for error messages.
pub fn printable_key(key: &str) -> String {
    key.replace(COMPOSITE_SEPARATOR, "")
}

/// One page of rich-query results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// `(key, value)` pairs in result order.
    pub records: Vec<(String, Vec<u8>)>,
    /// Opaque bookmark of the next page; empty when exhausted.
    pub bookmark: String,
}

/// One committed write of a public-state key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    /// `None` when the write deleted the key.
    pub value: Option<Vec<u8>>,
}

pub trait LedgerStub: Send {
    fn tx_id(&self) -> &str;

    fn tx_timestamp(&self) -> DateTime<Utc>;

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), CoreError>;

    fn del_state(&mut self, key: &str) -> Result<(), CoreError>;

    /// Committed writes of `key`, oldest first. Pending writes of this
    /// transaction are not included.
    fn key_history(&self, key: &str) -> Result<Vec<HistoryEntry>, CoreError>;

    /// All public-state entries whose key starts with `prefix`, key-ordered.
    fn scan_state(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, CoreError>;

    fn get_private_data(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, CoreError>;

    fn put_private_data(
        &mut self,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), CoreError>;

    fn del_private_data(&mut self, collection: &str, key: &str) -> Result<(), CoreError>;

    /// Rich query over public state, starting at `query.bookmark`.
    fn query_state(&self, query: &Query, page_size: usize) -> Result<QueryPage, CoreError>;

    /// Rich query over one private collection.
    fn query_private_data(
        &self,
        collection: &str,
        query: &Query,
        page_size: usize,
    ) -> Result<QueryPage, CoreError>;

    /// Make every buffered write visible atomically.
    fn commit(self: Box<Self>) -> Result<(), CoreError>;
}

/// A ledger able to open transactions.
pub trait Ledger: Send + Sync {
    fn transaction(&self, timestamp: DateTime<Utc>) -> Box<dyn LedgerStub>;
}
