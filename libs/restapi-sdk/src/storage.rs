use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

/// Namespace under which [`SessionStorage`] keeps its entries.
pub const STORAGE_NAMESPACE: &str = "TData";

/// Key-value storage shared by a client and its callers.
pub trait Storage: Send + Sync {
    fn set(&self, key: &str, value: Value);

    fn get(&self, key: &str) -> Option<Value>;

    fn remove(&self, key: &str);

    fn clear(&self);
}

/// In-memory storage scoped to one session.
///
/// Entries live in a single namespace map, so [`clear`](Storage::clear)
/// drops every key written through this storage and nothing else.
#[derive(Debug, Default)]
pub struct SessionStorage {
    sessions: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl SessionStorage {
    #[must_use]
    pub fn new() -> Self {
        let mut sessions = HashMap::new();
        sessions.insert(STORAGE_NAMESPACE.to_owned(), HashMap::new());
        Self {
            sessions: RwLock::new(sessions),
        }
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .get(STORAGE_NAMESPACE)
            .map_or(0, HashMap::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for SessionStorage {
    fn set(&self, key: &str, value: Value) {
        self.sessions
            .write()
            .entry(STORAGE_NAMESPACE.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.sessions
            .read()
            .get(STORAGE_NAMESPACE)
            .and_then(|ns| ns.get(key))
            .cloned()
    }

    fn remove(&self, key: &str) {
        if let Some(ns) = self.sessions.write().get_mut(STORAGE_NAMESPACE) {
            ns.remove(key);
        }
    }

    fn clear(&self) {
        self.sessions
            .write()
            .insert(STORAGE_NAMESPACE.to_owned(), HashMap::new());
    }
}
