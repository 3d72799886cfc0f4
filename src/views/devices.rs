/// Device administration page: registration and liveness of registered devices
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};

use crate::activity::{classify_device, LIVENESS_WINDOW};
use crate::api::ApiClient;
use crate::error::{ApiError, RegistryError};
use crate::models::{ApiDevice, Device, DeviceStatus, LastUpdated};
use crate::poll::{Completion, RequestTracker};
use crate::store::registry::DEVICES_KEY;
use crate::store::DeviceRegistry;
use crate::views::{poll_timer, ViewContext};

/// Registry edits requested from the admin console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Register { id: String, position: String },
    Unregister { id: String },
}

enum DevicesFetch {
    Catalog(Result<Vec<ApiDevice>, ApiError>),
    Statuses(Vec<(String, DeviceStatus)>),
}

pub struct DevicesView {
    ctx: ViewContext,
    registry: DeviceRegistry,
    catalog: Vec<ApiDevice>,
    registered: Vec<Device>,
    statuses: BTreeMap<String, DeviceStatus>,
    error: Option<String>,
    catalog_requests: RequestTracker,
    status_requests: RequestTracker,
}

/// Check every device once, concurrently
pub async fn check_devices(api: &ApiClient, devices: &[Device]) -> Vec<(String, DeviceStatus)> {
    let checks = devices.iter().map(|device| async move {
        let status = match api.latest_readings(&device.id).await {
            Ok(readings) => classify_device(&readings, OffsetDateTime::now_utc(), LIVENESS_WINDOW),
            Err(e) => {
                error!("Error checking status for device {}: {}", device.id, e);
                DeviceStatus::inactive(LastUpdated::CheckFailed)
            }
        };
        (device.id.clone(), status)
    });
    join_all(checks).await
}

impl DevicesView {
    pub fn new(ctx: ViewContext) -> Self {
        let registry = DeviceRegistry::new(ctx.store.clone());
        let registered = registry.load();
        DevicesView {
            ctx,
            registry,
            catalog: Vec::new(),
            registered,
            statuses: BTreeMap::new(),
            error: None,
            catalog_requests: RequestTracker::new("device catalog"),
            status_requests: RequestTracker::new("device status"),
        }
    }

    pub fn registered(&self) -> &[Device] {
        &self.registered
    }

    pub fn is_active(&self, device_id: &str) -> bool {
        self.statuses
            .get(device_id)
            .map(|s| s.is_active)
            .unwrap_or(false)
    }

    pub fn status(&self, device_id: &str) -> Option<&DeviceStatus> {
        self.statuses.get(device_id)
    }

    /// Register a backend device under a position label
    pub fn register(&mut self, device_id: &str, position: &str) -> Result<Device, RegistryError> {
        let result = self.registry.add(device_id, position);
        match &result {
            Ok(_) => self.error = None,
            Err(e) => self.error = Some(e.to_string()),
        }
        self.reload();
        result
    }

    pub fn unregister(&mut self, device_id: &str) -> Result<bool, RegistryError> {
        let removed = self.registry.remove(device_id)?;
        self.reload();
        Ok(removed)
    }

    fn handle_command(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::Register { id, position } => match self.register(&id, &position) {
                Ok(device) => info!("Registered device {} at {}", device.id, device.position),
                Err(e) => error!("Cannot register device {}: {}", id, e),
            },
            DeviceCommand::Unregister { id } => match self.unregister(&id) {
                Ok(true) => info!("Unregistered device {}", id),
                Ok(false) => warn!("Device {} is not registered", id),
                Err(e) => error!("Cannot unregister device {}: {}", id, e),
            },
        }
    }

    /// Re-read the registry, dropping statuses of devices no longer registered
    fn reload(&mut self) {
        self.registered = self.registry.load();
        let registered = &self.registered;
        self.statuses
            .retain(|id, _| registered.iter().any(|d| &d.id == id));
    }

    fn apply_catalog(&mut self, result: Result<Vec<ApiDevice>, ApiError>) {
        match result {
            Ok(catalog) => {
                self.catalog = catalog;
                self.error = None;
            }
            Err(e) => {
                error!("Error fetching devices: {}", e);
                self.error = Some("Error fetching devices. Please try again later.".to_string());
            }
        }
    }

    fn apply_statuses(&mut self, statuses: Vec<(String, DeviceStatus)>) {
        self.statuses = statuses
            .into_iter()
            .filter(|(id, _)| self.registered.iter().any(|d| &d.id == id))
            .collect();
    }

    /// Devices offered for registration: known to the backend, not yet registered
    pub fn unregistered_catalog(&self) -> Vec<&ApiDevice> {
        self.catalog
            .iter()
            .filter(|d| !self.registered.iter().any(|r| r.id == d.id))
            .collect()
    }

    fn check(&mut self, tx: &mpsc::UnboundedSender<Completion<DevicesFetch>>) {
        let api = self.ctx.api.clone();
        let devices = self.registered.clone();
        self.status_requests.spawn(tx, async move {
            DevicesFetch::Statuses(check_devices(&api, &devices).await)
        });
    }

    fn render(&self) {
        if let Some(error) = &self.error {
            error!("[devices] {}", error);
        }
        if self.registered.is_empty() {
            info!("[devices] No devices registered");
            return;
        }
        for device in &self.registered {
            let (state, last) = match self.statuses.get(&device.id) {
                Some(status) => (
                    if status.is_active { "active" } else { "inactive" },
                    status.last_updated.render(self.ctx.display_offset),
                ),
                None => ("inactive", "checking".to_string()),
            };
            info!("[devices] {} ({}): {}, last update {}", device.id, device.position, state, last);
        }
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<DeviceCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Watching {} registered devices", self.registered.len());

        let (tx, mut rx) = mpsc::unbounded_channel::<Completion<DevicesFetch>>();
        let mut store_events = self.ctx.store.subscribe();
        let mut activity_timer = poll_timer(self.ctx.intervals.activity);

        let api = self.ctx.api.clone();
        self.catalog_requests.spawn(&tx, async move {
            DevicesFetch::Catalog(api.list_devices().await)
        });

        loop {
            tokio::select! {
                _ = activity_timer.tick() => self.check(&tx),
                Some(command) = commands.recv() => self.handle_command(command),
                Some(done) = rx.recv() => match done.result {
                    DevicesFetch::Catalog(result) => {
                        if self.catalog_requests.accept(done.id) {
                            self.apply_catalog(result);
                            debug!("{} backend devices available to register", self.unregistered_catalog().len());
                        }
                    }
                    DevicesFetch::Statuses(statuses) => {
                        if self.status_requests.accept(done.id) {
                            self.apply_statuses(statuses);
                            self.render();
                        }
                    }
                },
                event = store_events.recv() => {
                    let relevant = match event {
                        Ok(event) => event.key == DEVICES_KEY,
                        Err(RecvError::Lagged(_)) => true,
                        Err(RecvError::Closed) => false,
                    };
                    if relevant {
                        // Another tab changed the set: check the new set right away
                        self.reload();
                        self.check(&tx);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        self.catalog_requests.cancel();
        self.status_requests.cancel();
        info!("Stopped watching devices");
    }
}
