//! Session-scoped key-value storage for breadcrumbs, tags and contexts.
//!
//! Values are JSON strings stored under fixed keys. They are read fresh on
//! every normalisation and flush, so anything written through one collector
//! handle is visible to the next capture without extra plumbing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::DEFAULT_MAX_BREADCRUMBS;
use crate::report::Breadcrumb;
use crate::TelemetryError;

/// Key holding the breadcrumb trail.
pub const BREADCRUMBS_KEY: &str = "lantern.breadcrumbs";

/// Key holding the custom tag map.
pub const TAGS_KEY: &str = "lantern.tags";

/// Key holding the custom context map.
pub const CONTEXTS_KEY: &str = "lantern.contexts";

/// Scoped string storage.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, TelemetryError>;

    fn set(&self, key: &str, value: String) -> Result<(), TelemetryError>;

    fn remove(&self, key: &str) -> Result<(), TelemetryError>;
}

/// Process-local store, also used in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, TelemetryError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), TelemetryError> {
        self.data.write().insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TelemetryError> {
        self.data.write().remove(key);
        Ok(())
    }
}

/// Typed view over a [`SessionStore`].
#[derive(Clone)]
pub struct SessionData {
    store: Arc<dyn SessionStore>,
    max_breadcrumbs: usize,
}

impl SessionData {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
        }
    }

    #[must_use]
    pub const fn with_max_breadcrumbs(mut self, max_breadcrumbs: usize) -> Self {
        self.max_breadcrumbs = max_breadcrumbs;
        self
    }

    /// Breadcrumb trail, oldest first.
    pub fn breadcrumbs(&self) -> Result<Vec<Breadcrumb>, TelemetryError> {
        self.read(BREADCRUMBS_KEY)
    }

    /// Append a breadcrumb, keeping only the most recent entries.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> Result<(), TelemetryError> {
        let mut trail = self.breadcrumbs()?;
        trail.push(breadcrumb);
        if trail.len() > self.max_breadcrumbs {
            let excess = trail.len() - self.max_breadcrumbs;
            trail.drain(..excess);
        }
        self.write(BREADCRUMBS_KEY, &trail)
    }

    /// Custom tags, ordered by key.
    pub fn tags(&self) -> Result<BTreeMap<String, String>, TelemetryError> {
        self.read(TAGS_KEY)
    }

    pub fn set_tag(&self, key: &str, value: &str) -> Result<(), TelemetryError> {
        let mut tags = self.tags()?;
        tags.insert(key.to_owned(), value.to_owned());
        self.write(TAGS_KEY, &tags)
    }

    /// Custom named contexts.
    pub fn contexts(&self) -> Result<Map<String, Value>, TelemetryError> {
        self.read(CONTEXTS_KEY)
    }

    pub fn set_context(&self, name: &str, value: Value) -> Result<(), TelemetryError> {
        let mut contexts = self.contexts()?;
        contexts.insert(name.to_owned(), value);
        self.write(CONTEXTS_KEY, &contexts)
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, TelemetryError> {
        match self.store.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|source| TelemetryError::JsonDecode { source }),
            None => Ok(T::default()),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), TelemetryError> {
        let raw =
            serde_json::to_string(value).map_err(|source| TelemetryError::JsonEncode { source })?;
        self.store.set(key, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::UnavailableStore;
    use serde_json::json;

    fn session() -> SessionData {
        SessionData::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn memory_store_removes_keys() {
        let store = MemoryStore::new();
        store.set("lantern.tags", "{}".to_owned()).unwrap();
        assert_eq!(store.get("lantern.tags").unwrap().as_deref(), Some("{}"));

        store.remove("lantern.tags").unwrap();
        assert_eq!(store.get("lantern.tags").unwrap(), None);
        store.remove("never_set").unwrap();
    }

    #[test]
    fn breadcrumbs_keep_most_recent() {
        let session = session().with_max_breadcrumbs(3);
        for i in 0..5 {
            session
                .add_breadcrumb(Breadcrumb::new(format!("step {i}"), "navigation"))
                .unwrap();
        }
        let trail = session.breadcrumbs().unwrap();
        let messages: Vec<_> = trail.iter().map(|b| b.message.as_str()).collect();
        assert_eq!(messages, ["step 2", "step 3", "step 4"]);
    }

    #[test]
    fn default_breadcrumb_cap_is_twenty() {
        let session = session();
        for i in 0..25 {
            session
                .add_breadcrumb(Breadcrumb::new(format!("click {i}"), "ui"))
                .unwrap();
        }
        assert_eq!(session.breadcrumbs().unwrap().len(), 20);
    }

    #[test]
    fn tags_and_contexts_round_trip_through_store() {
        let session = session();
        session.set_tag("region", "th").unwrap();
        session.set_tag("channel", "lazada").unwrap();
        session.set_context("cart", json!({"items": 3})).unwrap();

        let tags = session.tags().unwrap();
        assert_eq!(tags.keys().collect::<Vec<_>>(), ["channel", "region"]);
        assert_eq!(tags["channel"], "lazada");
        assert_eq!(session.contexts().unwrap()["cart"], json!({"items": 3}));
        assert!(session.breadcrumbs().unwrap().is_empty());
    }

    #[test]
    fn corrupt_value_is_a_decode_error() {
        let store = Arc::new(MemoryStore::new());
        store.set(TAGS_KEY, "not json".to_owned()).unwrap();
        let session = SessionData::new(store);
        assert!(matches!(
            session.tags(),
            Err(TelemetryError::JsonDecode { .. })
        ));
    }

    #[test]
    fn unavailable_store_surfaces_error() {
        let session = SessionData::new(Arc::new(UnavailableStore));
        assert!(matches!(
            session.add_breadcrumb(Breadcrumb::new("x", "y")),
            Err(TelemetryError::StoreUnavailable(_))
        ));
    }
}
