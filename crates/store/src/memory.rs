//! In-memory ledger with buffered, atomically committed transactions.
//!
//! [`MemoryLedger`] is a cheap, cloneable handle to shared committed state.
//! [`MemoryLedger::begin`] opens a [`MemoryTx`] that reads through its own
//! write overlay (including rich queries) and publishes the overlay only on
//! commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use ledgerdoc_core::asset::Object;
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::query::Query;
use serde_json::Value;

use crate::ledger::{HistoryEntry, Ledger, LedgerStub, QueryPage};
use crate::selector::{self, Selector};

#[derive(Debug, Default)]
struct Committed {
    state: BTreeMap<String, Vec<u8>>,
    private: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    history: BTreeMap<String, Vec<HistoryEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    committed: Arc<RwLock<Committed>>,
    sequence: Arc<AtomicU64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction stamped with `timestamp`.
    pub fn begin(&self, timestamp: DateTime<Utc>) -> MemoryTx {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        MemoryTx {
            committed: Arc::clone(&self.committed),
            tx_id: format!("tx-{n:08}"),
            timestamp,
            state_writes: BTreeMap::new(),
            private_writes: BTreeMap::new(),
        }
    }

    /// Committed public-state keys, in key order.
    pub fn state_keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(read(&self.committed)?.state.keys().cloned().collect())
    }
}

impl Ledger for MemoryLedger {
    fn transaction(&self, timestamp: DateTime<Utc>) -> Box<dyn LedgerStub> {
        Box::new(self.begin(timestamp))
    }
}

fn read(lock: &RwLock<Committed>) -> Result<RwLockReadGuard<'_, Committed>, CoreError> {
    lock.read()
        .map_err(|_| CoreError::Internal("ledger lock poisoned".into()))
}

// ---------------------------------------------------------------------------
// MemoryTx
// ---------------------------------------------------------------------------

/// A pending write: `Some` stores a value, `None` deletes the key.
type Overlay = BTreeMap<String, Option<Vec<u8>>>;

pub struct MemoryTx {
    committed: Arc<RwLock<Committed>>,
    tx_id: String,
    timestamp: DateTime<Utc>,
    state_writes: Overlay,
    private_writes: BTreeMap<String, Overlay>,
}

impl MemoryTx {
    fn merged_state(&self) -> Result<BTreeMap<String, Vec<u8>>, CoreError> {
        let mut view = read(&self.committed)?.state.clone();
        apply_overlay(&mut view, &self.state_writes);
        Ok(view)
    }

    fn merged_collection(&self, collection: &str) -> Result<BTreeMap<String, Vec<u8>>, CoreError> {
        let mut view = read(&self.committed)?
            .private
            .get(collection)
            .cloned()
            .unwrap_or_default();
        if let Some(overlay) = self.private_writes.get(collection) {
            apply_overlay(&mut view, overlay);
        }
        Ok(view)
    }
}

fn apply_overlay(view: &mut BTreeMap<String, Vec<u8>>, overlay: &Overlay) {
    for (key, write) in overlay {
        match write {
            Some(value) => {
                view.insert(key.clone(), value.clone());
            }
            None => {
                view.remove(key);
            }
        }
    }
}

/// Run a rich query over a key-ordered view.
///
/// Bookmarks are the decimal offset of the next page.
fn run_query(
    view: BTreeMap<String, Vec<u8>>,
    query: &Query,
    page_size: usize,
) -> Result<QueryPage, CoreError> {
    let sort = query.sort_fields()?;
    let offset = match query.bookmark.as_deref() {
        None | Some("") => 0,
        Some(bookmark) => bookmark
            .parse::<usize>()
            .map_err(|_| CoreError::BadRequest(format!("invalid bookmark: {bookmark}")))?,
    };

    let compiled = Selector::parse(&query.selector)?;
    let mut hits: Vec<(String, Value)> = Vec::new();
    for (key, bytes) in view {
        let Ok(doc @ Value::Object(_)) = serde_json::from_slice::<Value>(&bytes) else {
            continue;
        };
        if compiled.matches(&doc)? {
            hits.push((key, doc));
        }
    }
    if !sort.is_empty() {
        hits.sort_by(|(ka, a), (kb, b)| selector::compare_by(a, b, &sort).then_with(|| ka.cmp(kb)));
    }

    let total = hits.len();
    let mut records = Vec::new();
    for (key, doc) in hits.into_iter().skip(offset).take(page_size) {
        let doc = match doc {
            Value::Object(map) if !query.fields.is_empty() => {
                Value::Object(selector::project(&map, &query.fields))
            }
            other => other,
        };
        records.push((key, serde_json::to_vec(&doc)?));
    }

    let next = offset + records.len();
    let bookmark = if next < total { next.to_string() } else { String::new() };
    Ok(QueryPage { records, bookmark })
}

impl LedgerStub for MemoryTx {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn tx_timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        if let Some(write) = self.state_writes.get(key) {
            return Ok(write.clone());
        }
        Ok(read(&self.committed)?.state.get(key).cloned())
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), CoreError> {
        self.state_writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> Result<(), CoreError> {
        self.state_writes.insert(key.to_string(), None);
        Ok(())
    }

    fn key_history(&self, key: &str) -> Result<Vec<HistoryEntry>, CoreError> {
        Ok(read(&self.committed)?
            .history
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn scan_state(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, CoreError> {
        Ok(self
            .merged_state()?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect())
    }

    fn get_private_data(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        if let Some(write) = self.private_writes.get(collection).and_then(|o| o.get(key)) {
            return Ok(write.clone());
        }
        Ok(read(&self.committed)?
            .private
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned())
    }

    fn put_private_data(
        &mut self,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), CoreError> {
        self.private_writes
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_private_data(&mut self, collection: &str, key: &str) -> Result<(), CoreError> {
        self.private_writes
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), None);
        Ok(())
    }

    fn query_state(&self, query: &Query, page_size: usize) -> Result<QueryPage, CoreError> {
        run_query(self.merged_state()?, query, page_size)
    }

    fn query_private_data(
        &self,
        collection: &str,
        query: &Query,
        page_size: usize,
    ) -> Result<QueryPage, CoreError> {
        run_query(self.merged_collection(collection)?, query, page_size)
    }

    fn commit(self: Box<Self>) -> Result<(), CoreError> {
        let mut committed = self
            .committed
            .write()
            .map_err(|_| CoreError::Internal("ledger lock poisoned".into()))?;
        apply_overlay(&mut committed.state, &self.state_writes);
        for (key, write) in &self.state_writes {
            committed.history.entry(key.clone()).or_default().push(HistoryEntry {
                tx_id: self.tx_id.clone(),
                timestamp: self.timestamp,
                value: write.clone(),
            });
        }
        for (collection, overlay) in &self.private_writes {
            apply_overlay(committed.private.entry(collection.clone()).or_default(), overlay);
        }
        tracing::debug!(
            tx_id = %self.tx_id,
            state_writes = self.state_writes.len(),
            "transaction committed"
        );
        Ok(())
    }
}

/// Decode a stored JSON object.
pub fn decode_object(bytes: &[u8]) -> Result<Object, CoreError> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(CoreError::Internal("stored value is not a JSON object".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bytes(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    fn query(v: Value) -> Query {
        Query::from_object(v.as_object().cloned().unwrap()).unwrap()
    }

    #[test]
    fn writes_are_invisible_until_commit() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin(Utc::now());
        tx.put_state("k", b"v".to_vec()).unwrap();
        assert_eq!(tx.get_state("k").unwrap(), Some(b"v".to_vec()));

        let other = ledger.begin(Utc::now());
        assert_eq!(other.get_state("k").unwrap(), None);

        Box::new(tx).commit().unwrap();
        assert_eq!(ledger.begin(Utc::now()).get_state("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn dropped_transaction_discards_writes() {
        let ledger = MemoryLedger::new();
        {
            let mut tx = ledger.begin(Utc::now());
            tx.put_state("k", b"v".to_vec()).unwrap();
        }
        assert!(ledger.state_keys().unwrap().is_empty());
    }

    #[test]
    fn delete_in_overlay_hides_committed_value() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin(Utc::now());
        tx.put_state("k", b"v".to_vec()).unwrap();
        Box::new(tx).commit().unwrap();

        let mut tx = ledger.begin(Utc::now());
        tx.del_state("k").unwrap();
        assert_eq!(tx.get_state("k").unwrap(), None);
        assert!(tx.scan_state("").unwrap().is_empty());
    }

    #[test]
    fn history_records_committed_writes_in_order() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin(Utc::now());
        tx.put_state("k", b"1".to_vec()).unwrap();
        tx.put_state("k", b"2".to_vec()).unwrap();
        assert!(tx.key_history("k").unwrap().is_empty());
        Box::new(tx).commit().unwrap();

        let mut tx = ledger.begin(Utc::now());
        tx.del_state("k").unwrap();
        Box::new(tx).commit().unwrap();

        // a dropped transaction leaves no trace
        let mut tx = ledger.begin(Utc::now());
        tx.put_state("k", b"3".to_vec()).unwrap();
        drop(tx);

        let history = ledger.begin(Utc::now()).key_history("k").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].tx_id, "tx-00000001");
        assert_eq!(history[0].value, Some(b"2".to_vec()));
        assert_eq!(history[1].tx_id, "tx-00000002");
        assert_eq!(history[1].value, None);
    }

    #[test]
    fn private_collections_are_isolated() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin(Utc::now());
        tx.put_private_data("A", "k", b"1".to_vec()).unwrap();
        assert_eq!(tx.get_private_data("B", "k").unwrap(), None);
        assert_eq!(tx.get_state("k").unwrap(), None);
        assert_eq!(tx.get_private_data("A", "k").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn query_pages_with_bookmark() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin(Utc::now());
        for n in 0..5 {
            tx.put_state(&format!("k{n}"), bytes(json!({"docType": "X", "n": n})))
                .unwrap();
        }
        tx.put_state("other", bytes(json!({"docType": "Y"}))).unwrap();

        let first = tx
            .query_state(&query(json!({"selector": {"docType": "X"}, "sort": [{"n": "desc"}]})), 2)
            .unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.records[0].0, "k4");
        assert_eq!(first.bookmark, "2");

        let last = tx
            .query_state(
                &query(json!({"selector": {"docType": "X"}, "sort": [{"n": "desc"}], "bookmark": "4"})),
                2,
            )
            .unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.records[0].0, "k0");
        assert!(last.bookmark.is_empty());
    }

    #[test]
    fn invalid_bookmark_rejects() {
        let ledger = MemoryLedger::new();
        let tx = ledger.begin(Utc::now());
        assert!(tx.query_state(&query(json!({"bookmark": "abc"})), 10).is_err());
    }
}
