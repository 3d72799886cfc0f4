/// The locally registered device set
use log::{info, warn};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::models::{Device, UserInfo};
use crate::store::KeyValueStore;

pub const DEVICES_KEY: &str = "addedDevices";

#[derive(Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        DeviceRegistry { store }
    }

    /// Registered devices. Unreadable content is cleared and treated as empty.
    pub fn load(&self) -> Vec<Device> {
        let raw = match self.store.get(DEVICES_KEY) {
            Some(raw) => raw,
            None => return Vec::new(),
        };

        match serde_json::from_str::<Vec<Device>>(&raw) {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Invalid {} in store, clearing it: {}", DEVICES_KEY, e);
                if let Err(e) = self.store.remove(DEVICES_KEY) {
                    warn!("Failed to clear {}: {}", DEVICES_KEY, e);
                }
                Vec::new()
            }
        }
    }

    /// Devices the given user may see: non-admins assigned to a device only see that one
    pub fn visible_to(&self, user: &UserInfo) -> Vec<Device> {
        let devices = self.load();
        match (&user.device_id, user.is_admin) {
            (Some(device_id), false) => devices
                .into_iter()
                .filter(|device| &device.id == device_id)
                .collect(),
            _ => devices,
        }
    }

    pub fn find(&self, device_id: &str) -> Option<Device> {
        self.load().into_iter().find(|device| device.id == device_id)
    }

    pub fn add(&self, id: &str, position: &str) -> Result<Device, RegistryError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(RegistryError::MissingId);
        }
        if position.trim().is_empty() {
            return Err(RegistryError::MissingPosition);
        }

        let position = sanitize_position(position);
        if position.is_empty() {
            return Err(RegistryError::InvalidPosition);
        }

        let mut devices = self.load();
        if devices.iter().any(|device| device.id == id) {
            return Err(RegistryError::Duplicate);
        }

        let device = Device {
            id: id.to_string(),
            position,
        };
        devices.push(device.clone());
        self.save(&devices)?;

        info!("Registered device {} at {}", device.id, device.position);
        Ok(device)
    }

    /// Remove a device. Returns whether it was registered.
    pub fn remove(&self, device_id: &str) -> Result<bool, RegistryError> {
        let mut devices = self.load();
        let before = devices.len();
        devices.retain(|device| device.id != device_id);
        if devices.len() == before {
            return Ok(false);
        }

        self.save(&devices)?;
        info!("Removed device {}", device_id);
        Ok(true)
    }

    fn save(&self, devices: &[Device]) -> Result<(), RegistryError> {
        let raw = serde_json::to_string(devices).map_err(|e| RegistryError::Store(e.to_string()))?;
        self.store.set(DEVICES_KEY, &raw)?;
        Ok(())
    }
}

/// Keep letters, digits, whitespace and hyphens
pub fn sanitize_position(position: &str) -> String {
    position
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;

    fn registry() -> (tempfile::TempDir, DeviceRegistry, Arc<FileStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path().join("store.json")).unwrap());
        (dir, DeviceRegistry::new(store.clone()), store)
    }

    #[test]
    fn adds_and_removes_devices() {
        let (_dir, registry, _) = registry();

        let device = registry.add("dev-1", "  Ground floor <left>! ").unwrap();
        assert_eq!(device.position, "Ground floor left");
        registry.add("dev-2", "Lab-2").unwrap();
        assert_eq!(registry.load().len(), 2);
        assert_eq!(registry.find("dev-2").unwrap().position, "Lab-2");

        assert!(registry.remove("dev-1").unwrap());
        assert!(!registry.remove("dev-1").unwrap());
        assert_eq!(registry.load(), vec![Device { id: "dev-2".into(), position: "Lab-2".into() }]);
    }

    #[test]
    fn rejects_invalid_additions() {
        let (_dir, registry, _) = registry();
        registry.add("dev-1", "Hall").unwrap();

        assert_eq!(registry.add("", "Hall"), Err(RegistryError::MissingId));
        assert_eq!(registry.add("dev-2", "   "), Err(RegistryError::MissingPosition));
        assert_eq!(registry.add("dev-2", "<>!"), Err(RegistryError::InvalidPosition));
        assert_eq!(registry.add("dev-1", "Kitchen"), Err(RegistryError::Duplicate));
        assert_eq!(registry.load().len(), 1);
    }

    #[test]
    fn invalid_stored_devices_are_cleared() {
        let (_dir, registry, store) = registry();
        store.set(DEVICES_KEY, "{\"id\":\"not a list\"}").unwrap();

        assert!(registry.load().is_empty());
        assert_eq!(store.get(DEVICES_KEY), None);
    }

    #[test]
    fn non_admins_only_see_their_device() {
        let (_dir, registry, _) = registry();
        registry.add("dev-1", "Hall").unwrap();
        registry.add("dev-2", "Lab").unwrap();

        let admin = UserInfo { is_admin: true, username: None, email: None, device_id: None };
        let user = UserInfo { is_admin: false, device_id: Some("dev-2".into()), ..admin.clone() };
        let unassigned = UserInfo { is_admin: false, ..admin.clone() };

        assert_eq!(registry.visible_to(&admin).len(), 2);
        assert_eq!(registry.visible_to(&user)[0].id, "dev-2");
        assert_eq!(registry.visible_to(&unassigned).len(), 2);
    }

    #[test]
    fn changes_are_observable_by_subscribers() {
        let (_dir, registry, store) = registry();
        let mut events = store.subscribe();

        registry.add("dev-1", "Hall").unwrap();
        assert_eq!(events.try_recv().unwrap().key, DEVICES_KEY);
    }
}
