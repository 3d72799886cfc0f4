use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::StoreError;
use crate::store::{KeyValueStore, StoreEvent};

const EVENT_CAPACITY: usize = 64;

/// JSON-file backed store: one object mapping keys to string values
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    events: broadcast::Sender<StoreEvent>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = read_entries(&path)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(FileStore {
            path,
            entries: Mutex::new(entries),
            events,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and announce every key whose value differs
    pub fn reload(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock();
        let changed = merge_from_disk(&self.path, &mut entries)?;
        drop(entries);

        for key in &changed {
            self.notify(key);
        }
        Ok(changed)
    }

    fn update(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        // Pick up foreign writes first so they are not clobbered
        let mut changed = merge_from_disk(&self.path, &mut entries)?;

        let previous = match value {
            Some(value) => entries.insert(key.to_string(), value.to_string()),
            None => entries.remove(key),
        };
        write_entries(&self.path, &entries)?;
        drop(entries);

        if previous.as_deref() != value {
            changed.push(key.to_string());
        }
        for key in &changed {
            self.notify(key);
        }
        Ok(())
    }

    fn notify(&self, key: &str) {
        // No receivers is fine
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
        });
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(key, None)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };

    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    match serde_json::from_str(&text) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            warn!("Store file {} is corrupt, starting empty: {}", path.display(), e);
            Ok(BTreeMap::new())
        }
    }
}

fn merge_from_disk(
    path: &Path,
    entries: &mut BTreeMap<String, String>,
) -> Result<Vec<String>, StoreError> {
    let disk = read_entries(path)?;
    let mut changed: Vec<String> = entries
        .keys()
        .filter(|key| !disk.contains_key(*key))
        .cloned()
        .collect();
    changed.extend(
        disk.iter()
            .filter(|(key, value)| entries.get(*key) != Some(*value))
            .map(|(key, _)| key.clone()),
    );

    *entries = disk;
    Ok(changed)
}

fn write_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(entries)?;
    // Each writer gets its own temp file next to the store, then renames it over
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Poll the backing file so changes from other processes are announced
pub fn spawn_watcher(
    store: Arc<FileStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.reload() {
                        Ok(changed) if !changed.is_empty() => {
                            debug!("Store keys changed externally: {:?}", changed);
                        }
                        Ok(_) => {}
                        Err(e) => error!("Failed to reload store {}: {}", store.path().display(), e),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> FileStore {
        FileStore::open(dir.path().join("store.json")).unwrap()
    }

    #[test]
    fn set_get_remove_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.get("userInfo"), None);
        store.set("userInfo", "{\"isAdmin\":true}").unwrap();
        assert_eq!(store.get("userInfo").as_deref(), Some("{\"isAdmin\":true}"));

        let reopened = store_in(&dir);
        assert_eq!(reopened.get("userInfo"), store.get("userInfo"));

        store.remove("userInfo").unwrap();
        assert_eq!(store.get("userInfo"), None);
    }

    #[test]
    fn writes_are_announced() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut events = store.subscribe();

        store.set("addedDevices", "[]").unwrap();
        store.set("addedDevices", "[]").unwrap();
        store.remove("addedDevices").unwrap();

        assert_eq!(events.try_recv().unwrap().key, "addedDevices");
        assert_eq!(events.try_recv().unwrap().key, "addedDevices");
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn reload_reports_writes_from_another_handle() {
        let dir = tempfile::tempdir().unwrap();
        let first = store_in(&dir);
        let second = store_in(&dir);
        let mut events = first.subscribe();

        second.set("addedDevices", "[{\"id\":\"a\",\"position\":\"Hall\"}]").unwrap();
        assert_eq!(first.get("addedDevices"), None);

        assert_eq!(first.reload().unwrap(), vec!["addedDevices".to_string()]);
        assert_eq!(events.try_recv().unwrap().key, "addedDevices");
        assert!(first.get("addedDevices").is_some());
        assert!(first.reload().unwrap().is_empty());
    }

    #[test]
    fn writes_keep_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let first = store_in(&dir);
        let second = store_in(&dir);

        second.set("userInfo", "{}").unwrap();
        first.set("addedDevices", "[]").unwrap();

        let reopened = store_in(&dir);
        assert!(reopened.get("userInfo").is_some());
        assert!(reopened.get("addedDevices").is_some());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("store.json"), "{not json").unwrap();
        let store = store_in(&dir);
        assert_eq!(store.get("userInfo"), None);
    }

    #[test]
    fn concurrent_writers_leave_a_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = FileStore::open(&path).unwrap();
                    for n in 0..20 {
                        store.set(&format!("writer-{}", i), &n.to_string()).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let text = fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<BTreeMap<String, String>>(&text).is_ok());
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn watcher_announces_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));
        let other = store_in(&dir);
        let mut events = store.subscribe();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = spawn_watcher(store.clone(), Duration::from_millis(10), stop_rx);
        other.set("addedDevices", "[]").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.key, "addedDevices");

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
