/// Overview page: device and user totals, selected device's AQI and trend
use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};

use crate::error::{ApiError, UserError};
use crate::gas::{calculate_aqi, AqiLevel};
use crate::models::{ApiDevice, Device, GasSnapshot, SensorReading};
use crate::poll::{Completion, RequestTracker};
use crate::store::registry::DEVICES_KEY;
use crate::store::session::SESSION_KEY;
use crate::store::{DeviceRegistry, Session};
use crate::trend::{SnapshotHistory, DASHBOARD_HISTORY_CAPACITY};
use crate::users::UserDirectory;
use crate::utils::format_datetime;
use crate::views::{poll_timer, ViewContext};

enum DashboardFetch {
    Devices(Result<Vec<ApiDevice>, ApiError>),
    Users(Result<usize, UserError>),
    Readings {
        device_id: String,
        result: Result<Vec<SensorReading>, ApiError>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceTotals {
    pub total: usize,
    pub active: usize,
}

pub struct DashboardView {
    ctx: ViewContext,
    session: Session,
    registry: DeviceRegistry,
    users: UserDirectory,
    devices: Vec<Device>,
    selected: Option<String>,
    history: SnapshotHistory,
    totals: DeviceTotals,
    user_count: usize,
    devices_error: Option<String>,
    gas_error: Option<String>,
    clock: OffsetDateTime,
    device_requests: RequestTracker,
    user_requests: RequestTracker,
    reading_requests: RequestTracker,
}

impl DashboardView {
    pub fn new(ctx: ViewContext, session: Session) -> Self {
        let registry = DeviceRegistry::new(ctx.store.clone());
        let users = UserDirectory::new(ctx.api.clone());
        let mut view = DashboardView {
            ctx,
            session,
            registry,
            users,
            devices: Vec::new(),
            selected: None,
            history: SnapshotHistory::new(DASHBOARD_HISTORY_CAPACITY),
            totals: DeviceTotals::default(),
            user_count: 0,
            devices_error: None,
            gas_error: None,
            clock: OffsetDateTime::now_utc(),
            device_requests: RequestTracker::new("device list"),
            user_requests: RequestTracker::new("user list"),
            reading_requests: RequestTracker::new("dashboard readings"),
        };
        view.reload_devices();
        view
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn totals(&self) -> DeviceTotals {
        self.totals
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn aqi(&self) -> i64 {
        calculate_aqi(self.history.latest())
    }

    /// Re-read the registered devices visible to this session
    fn reload_devices(&mut self) {
        self.devices = self.registry.visible_to(&self.session.user);

        let still_there = self
            .selected
            .as_ref()
            .map(|id| self.devices.iter().any(|d| &d.id == id))
            .unwrap_or(false);
        if !still_there {
            let next = self.devices.first().map(|d| d.id.clone());
            if next != self.selected {
                debug!("Dashboard device selection: {:?}", next);
                self.selected = next;
                self.history.clear();
                self.reading_requests.cancel();
            }
        }
    }

    fn apply_devices(&mut self, result: Result<Vec<ApiDevice>, ApiError>) {
        match result {
            Ok(devices) => {
                self.totals = DeviceTotals {
                    total: devices.len(),
                    active: devices.iter().filter(|d| d.is_active()).count(),
                };
                self.devices_error = None;
            }
            Err(e) => {
                error!("Error fetching devices: {}", e);
                self.totals = DeviceTotals::default();
                self.devices_error = Some("Failed to fetch device data. Please try again later.".to_string());
            }
        }
    }

    fn apply_users(&mut self, result: Result<usize, UserError>) {
        self.user_count = result.unwrap_or_else(|e| {
            error!("Error fetching users: {}", e);
            0
        });
    }

    fn apply_readings(
        &mut self,
        device_id: &str,
        result: Result<Vec<SensorReading>, ApiError>,
        now: OffsetDateTime,
    ) {
        if self.selected.as_deref() != Some(device_id) {
            debug!("Ignoring readings for deselected device {}", device_id);
            return;
        }

        match result {
            Ok(readings) => {
                if let Some(snapshot) = GasSnapshot::latest(&readings, now) {
                    self.history.push(snapshot);
                }
                self.gas_error = None;
            }
            Err(e) => {
                error!("Error fetching gas data for device {}: {}", device_id, e);
                self.gas_error = Some("Failed to fetch gas data. Please try again later.".to_string());
            }
        }
    }

    fn poll(&mut self, tx: &mpsc::UnboundedSender<Completion<DashboardFetch>>) {
        if self.session.is_admin() {
            let api = self.ctx.api.clone();
            self.device_requests.spawn(tx, async move {
                DashboardFetch::Devices(api.list_devices().await)
            });
        }

        if let Some(device_id) = self.selected.clone() {
            let api = self.ctx.api.clone();
            self.reading_requests.spawn(tx, async move {
                let result = api.latest_readings(&device_id).await;
                DashboardFetch::Readings { device_id, result }
            });
        }
    }

    fn fetch_users(&mut self, tx: &mpsc::UnboundedSender<Completion<DashboardFetch>>) {
        if !self.session.is_admin() {
            return;
        }
        let users = self.users.clone();
        self.user_requests.spawn(tx, async move {
            DashboardFetch::Users(users.count().await)
        });
    }

    fn render(&self) {
        for error in [&self.devices_error, &self.gas_error].into_iter().flatten() {
            warn!("[dashboard] {}", error);
        }

        if self.session.is_admin() {
            info!(
                "[dashboard] {} | users: {} | devices: {} ({} active)",
                format_datetime(&self.clock.to_offset(self.ctx.display_offset)),
                self.user_count,
                self.totals.total,
                self.totals.active
            );
        }

        match &self.selected {
            Some(device_id) => {
                let aqi = self.aqi();
                info!(
                    "[dashboard] {} AQI: {} ({}), {} snapshots",
                    device_id,
                    aqi,
                    AqiLevel::from_score(aqi).label(),
                    self.history.len()
                );
            }
            None => info!("[dashboard] Please select a device to view AQI"),
        }
    }

    /// Returns false when the session has ended and the view must close
    fn on_store_change(&mut self, key: &str) -> bool {
        if key == DEVICES_KEY {
            self.reload_devices();
        } else if key == SESSION_KEY {
            match Session::load(self.ctx.store.as_ref()) {
                Some(session) => {
                    self.session = session;
                    self.reload_devices();
                }
                None => {
                    info!("Session for {} ended, sign in again", self.session.display_name());
                    return false;
                }
            }
        }
        true
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Opening dashboard for {}", self.session.display_name());

        let (tx, mut rx) = mpsc::unbounded_channel::<Completion<DashboardFetch>>();
        let mut store_events = self.ctx.store.subscribe();
        let mut poll_ticker = poll_timer(self.ctx.intervals.dashboard);
        let mut clock_ticker = poll_timer(self.ctx.intervals.clock);

        self.fetch_users(&tx);

        loop {
            tokio::select! {
                _ = poll_ticker.tick() => self.poll(&tx),
                _ = clock_ticker.tick() => self.clock = OffsetDateTime::now_utc(),
                Some(done) = rx.recv() => {
                    let now = OffsetDateTime::now_utc();
                    match done.result {
                        DashboardFetch::Devices(result) => {
                            if self.device_requests.accept(done.id) {
                                self.apply_devices(result);
                            }
                        }
                        DashboardFetch::Users(result) => {
                            if self.user_requests.accept(done.id) {
                                self.apply_users(result);
                            }
                        }
                        DashboardFetch::Readings { device_id, result } => {
                            if self.reading_requests.accept(done.id) {
                                self.apply_readings(&device_id, result, now);
                                self.render();
                            }
                        }
                    }
                }
                event = store_events.recv() => {
                    let keep_open = match event {
                        Ok(event) => self.on_store_change(&event.key),
                        Err(RecvError::Lagged(_)) => {
                            self.on_store_change(SESSION_KEY) && self.on_store_change(DEVICES_KEY)
                        }
                        Err(RecvError::Closed) => true,
                    };
                    if !keep_open {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        self.device_requests.cancel();
        self.user_requests.cancel();
        self.reading_requests.cancel();
        info!("Closed dashboard");
    }
}
