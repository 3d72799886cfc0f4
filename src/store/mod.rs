/// Client-side key-value store shared by the dashboard views
///
/// Values are strings (JSON-encoded records). Every write is announced on
/// a broadcast channel, and a watcher task re-reads the backing file so
/// writes made by other processes sharing the file are announced too.
pub mod file;
#[cfg(test)]
pub mod memory;
pub mod registry;
pub mod session;

pub use file::{spawn_watcher, FileStore};
#[cfg(test)]
pub use memory::MemoryStore;
pub use registry::DeviceRegistry;
pub use session::Session;

use tokio::sync::broadcast;

use crate::error::StoreError;

/// A key whose value changed, locally or in another process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
