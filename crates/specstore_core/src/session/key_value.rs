//! Key-value session contract and the embedded in-process client.
//!
//! # Invariants
//! - Keys are plain strings; values are opaque strings (JSON for models).
//! - Between `multi` and `exec` writes are visible to the same session;
//!   `discard` restores the state captured by `multi`.

use crate::error::{BackendError, BackendResult};
use crate::spec::value::glob_regex;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Primitives of a key-value session.
pub trait KeyValueSession {
    /// Keys matching a glob pattern, in lexical order.
    fn keys(&self, pattern: &str) -> BackendResult<Vec<String>>;
    /// Values for `keys`, `None` where a key is absent.
    fn mget(&self, keys: &[String]) -> BackendResult<Vec<Option<String>>>;
    fn set(&self, key: &str, value: String) -> BackendResult<()>;
    fn mset(&self, entries: Vec<(String, String)>) -> BackendResult<()>;
    /// Removes `keys`, returning how many existed.
    fn del(&self, keys: &[String]) -> BackendResult<u64>;
    fn multi(&self) -> BackendResult<()>;
    fn exec(&self) -> BackendResult<()>;
    fn discard(&self) -> BackendResult<()>;
}

#[derive(Debug, Default)]
struct KeyValueState {
    entries: BTreeMap<String, String>,
    snapshot: Option<BTreeMap<String, String>>,
}

/// Embedded key-value store. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueClient {
    state: Arc<Mutex<KeyValueState>>,
}

impl MemoryKeyValueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }
}

impl KeyValueSession for MemoryKeyValueClient {
    fn keys(&self, pattern: &str) -> BackendResult<Vec<String>> {
        let matcher = glob_regex(pattern)?;
        let state = self.state.lock();
        Ok(state
            .entries
            .keys()
            .filter(|key| matcher.is_match(key))
            .cloned()
            .collect())
    }

    fn mget(&self, keys: &[String]) -> BackendResult<Vec<Option<String>>> {
        let state = self.state.lock();
        Ok(keys.iter().map(|key| state.entries.get(key).cloned()).collect())
    }

    fn set(&self, key: &str, value: String) -> BackendResult<()> {
        self.state.lock().entries.insert(key.to_string(), value);
        Ok(())
    }

    fn mset(&self, entries: Vec<(String, String)>) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.entries.extend(entries);
        Ok(())
    }

    fn del(&self, keys: &[String]) -> BackendResult<u64> {
        let mut state = self.state.lock();
        Ok(keys
            .iter()
            .filter(|key| state.entries.remove(key.as_str()).is_some())
            .count() as u64)
    }

    fn multi(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.snapshot.is_some() {
            return Err(BackendError::native("MULTI calls can not be nested"));
        }
        state.snapshot = Some(state.entries.clone());
        Ok(())
    }

    fn exec(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.snapshot.take().is_none() {
            return Err(BackendError::native("EXEC without MULTI"));
        }
        Ok(())
    }

    fn discard(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        match state.snapshot.take() {
            Some(snapshot) => {
                state.entries = snapshot;
                Ok(())
            }
            None => Err(BackendError::native("DISCARD without MULTI")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyValueSession, MemoryKeyValueClient};

    #[test]
    fn keys_follow_glob_patterns() {
        let client = MemoryKeyValueClient::new();
        client
            .mset(vec![
                ("users:u1".into(), "{}".into()),
                ("users:u2".into(), "{}".into()),
                ("orders:o1".into(), "{}".into()),
            ])
            .unwrap();
        assert_eq!(client.keys("users:*").unwrap(), vec!["users:u1", "users:u2"]);
        assert_eq!(client.keys("*:o?").unwrap(), vec!["orders:o1"]);
        assert_eq!(client.keys("*").unwrap().len(), 3);
        assert_eq!(
            client
                .mget(&["users:u1".to_string(), "users:zz".to_string()])
                .unwrap(),
            vec![Some("{}".to_string()), None]
        );
    }

    #[test]
    fn del_counts_existing_keys() {
        let client = MemoryKeyValueClient::new();
        client.set("a", "1".into()).unwrap();
        assert_eq!(client.del(&["a".to_string(), "b".to_string()]).unwrap(), 1);
        assert_eq!(client.keys("*").unwrap().len(), 0);
    }

    #[test]
    fn discard_restores_and_exec_keeps() {
        let client = MemoryKeyValueClient::new();
        client.set("a", "1".into()).unwrap();

        client.multi().unwrap();
        client.set("b", "2".into()).unwrap();
        assert_eq!(client.keys("*").unwrap().len(), 2);
        client.discard().unwrap();
        assert_eq!(client.keys("*").unwrap().len(), 1);

        client.multi().unwrap();
        assert!(client.multi().is_err());
        client.set("c", "3".into()).unwrap();
        client.exec().unwrap();
        assert_eq!(client.keys("*").unwrap().len(), 2);
        assert!(client.exec().is_err());
    }
}
