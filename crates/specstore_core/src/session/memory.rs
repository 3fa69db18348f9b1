//! In-process store backing the in-memory repository.
//!
//! Records are kept per model name in insertion order. `begin` snapshots the
//! whole store; `rollback` restores it.

use crate::error::{BackendError, BackendResult};
use crate::model::Record;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Tables = HashMap<String, IndexMap<String, Record>>;

#[derive(Debug, Default)]
struct StoreState {
    tables: Tables,
    snapshot: Option<Tables>,
}

/// Shared in-memory store. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record of `table`, in insertion order.
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, table: &str) -> usize {
        self.state.lock().tables.get(table).map_or(0, IndexMap::len)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Inserts or replaces the record stored under `id`.
    pub fn upsert(&self, table: &str, id: &str, record: Record) {
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), record);
    }

    /// Removes the records stored under `ids`, returning how many existed.
    pub fn remove(&self, table: &str, ids: &[String]) -> usize {
        let mut state = self.state.lock();
        let Some(rows) = state.tables.get_mut(table) else {
            return 0;
        };
        ids.iter()
            .filter(|id| rows.shift_remove(id.as_str()).is_some())
            .count()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }

    pub fn begin(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.snapshot.is_some() {
            return Err(BackendError::native("in-memory transaction already active"));
        }
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    pub fn commit(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.snapshot.take().is_none() {
            return Err(BackendError::native("no in-memory transaction active"));
        }
        Ok(())
    }

    pub fn rollback(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        match state.snapshot.take() {
            Some(snapshot) => {
                state.tables = snapshot;
                Ok(())
            }
            None => Err(BackendError::native("no in-memory transaction active")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use serde_json::{json, Map, Value};

    fn record(id: &str) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("id".into(), json!(id));
        record
    }

    #[test]
    fn upsert_keeps_insertion_order_and_replaces() {
        let store = MemoryStore::new();
        store.upsert("t", "b", record("b"));
        store.upsert("t", "a", record("a"));
        store.upsert("t", "b", record("b"));
        let ids: Vec<Value> = store.records("t").into_iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("a")]);
        assert_eq!(store.remove("t", &["a".into(), "zz".into()]), 1);
        assert_eq!(store.len("t"), 1);
        assert!(store.is_empty("other"));
    }

    #[test]
    fn rollback_restores_snapshot() {
        let store = MemoryStore::new();
        store.upsert("t", "a", record("a"));
        store.begin().unwrap();
        assert!(store.begin().is_err());
        store.upsert("t", "b", record("b"));
        store.rollback().unwrap();
        assert_eq!(store.len("t"), 1);
        assert!(store.commit().is_err());
    }
}
