use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::store::{KeyValueStore, StoreEvent};

const EVENT_CAPACITY: usize = 64;

/// Process-local store with the same change notifications as FileStore
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        MemoryStore {
            entries: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    fn update(&self, key: &str, value: Option<&str>) {
        let previous = {
            let mut entries = self.entries.lock();
            match value {
                Some(value) => entries.insert(key.to_string(), value.to_string()),
                None => entries.remove(key),
            }
        };

        if previous.as_deref() != value {
            let _ = self.events.send(StoreEvent {
                key: key.to_string(),
            });
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(key, None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_real_changes_are_announced() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();

        store.set("addedDevices", "[]").unwrap();
        store.set("addedDevices", "[]").unwrap();
        assert_eq!(store.get("addedDevices").as_deref(), Some("[]"));

        store.remove("addedDevices").unwrap();
        store.remove("addedDevices").unwrap();
        assert_eq!(store.get("addedDevices"), None);

        assert_eq!(events.try_recv().unwrap().key, "addedDevices");
        assert_eq!(events.try_recv().unwrap().key, "addedDevices");
        assert!(events.try_recv().is_err());
    }
}
