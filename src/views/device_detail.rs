/// Live and hourly trends for a single device
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};

use crate::error::{AccessError, ApiError};
use crate::gas::canonical_gas_name;
use crate::models::{Device, HistoricalPoint, HourlyBucket, SensorReading, TrendPoint};
use crate::poll::{Completion, RequestTracker};
use crate::store::registry::DEVICES_KEY;
use crate::store::{DeviceRegistry, StoreEvent};
use crate::trend::{bucket_history, TrendBuffers, DETAIL_TREND_CAPACITY};
use crate::utils::clock_label;
use crate::views::{format_ppm, poll_timer, ViewContext};

/// Which trend the charts show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendView {
    /// Recent polls, one point per live reading
    Recent,
    /// Fixed buckets over the last hour
    Hourly,
}

enum DetailFetch {
    Live(Result<Vec<SensorReading>, ApiError>),
    History(Result<HashMap<String, Vec<HistoricalPoint>>, ApiError>),
}

pub struct DeviceDetailView {
    ctx: ViewContext,
    device: Device,
    registry: DeviceRegistry,
    store_events: broadcast::Receiver<StoreEvent>,
    readings: Vec<SensorReading>,
    trends: TrendBuffers,
    hourly: BTreeMap<String, Vec<HourlyBucket>>,
    error: Option<String>,
    live_requests: RequestTracker,
    history_requests: RequestTracker,
}

impl DeviceDetailView {
    /// Open the view for a device known to the backend and registered locally
    pub async fn open(
        ctx: ViewContext,
        registry: &DeviceRegistry,
        device_id: &str,
    ) -> Result<Self, AccessError> {
        let known = ctx.api.list_devices().await?;
        if !known.iter().any(|d| d.id == device_id) {
            return Err(AccessError::UnknownDevice);
        }
        let device = registry.find(device_id).ok_or(AccessError::NotRegistered)?;

        Ok(Self::for_device(ctx, device))
    }

    /// Keep trying to open while the backend is unreachable. Gives up on a
    /// definite answer about the device; `Ok(None)` means shutdown came first.
    pub async fn open_when_ready(
        ctx: ViewContext,
        registry: &DeviceRegistry,
        device_id: &str,
        retry: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<Self>, AccessError> {
        loop {
            match Self::open(ctx.clone(), registry, device_id).await {
                Ok(view) => return Ok(Some(view)),
                Err(AccessError::Api(e)) => {
                    warn!("Cannot validate device {} yet, retrying in {:?}: {}", device_id, retry, e);
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = tokio::time::sleep(retry) => {}
                _ = shutdown.changed() => return Ok(None),
            }
        }
    }

    fn for_device(ctx: ViewContext, device: Device) -> Self {
        let registry = DeviceRegistry::new(ctx.store.clone());
        let store_events = ctx.store.subscribe();
        DeviceDetailView {
            ctx,
            device,
            registry,
            store_events,
            readings: Vec::new(),
            trends: TrendBuffers::new(DETAIL_TREND_CAPACITY),
            hourly: BTreeMap::new(),
            error: None,
            live_requests: RequestTracker::new("live readings"),
            history_requests: RequestTracker::new("historical data"),
        }
    }

    pub fn readings(&self) -> &[SensorReading] {
        &self.readings
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Chart points for a gas in the chosen view
    pub fn trend(&self, gas: &str, view: TrendView) -> Vec<TrendPoint> {
        match view {
            TrendView::Recent => self
                .trends
                .get(gas)
                .map(|buffer| buffer.points().cloned().collect())
                .unwrap_or_default(),
            TrendView::Hourly => self
                .hourly
                .get(&canonical_gas_name(gas))
                .map(|buckets| {
                    buckets
                        .iter()
                        .map(|b| TrendPoint {
                            time: b.time_label.clone(),
                            ppm: b.average_ppm,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn apply_live(&mut self, result: Result<Vec<SensorReading>, ApiError>, now: OffsetDateTime) {
        match result {
            Ok(readings) if readings.is_empty() => {
                debug!("No live readings for device {}", self.device.id);
            }
            Ok(readings) => {
                let label = clock_label(&now, self.ctx.display_offset);
                self.trends.record(&readings, &label);
                self.readings = readings;
                self.error = None;
            }
            Err(e) => {
                error!("Error fetching data for device {}: {}", self.device.id, e);
                self.readings.clear();
                self.error = Some("Failed to fetch sensor data. Please try again later.".to_string());
            }
        }
    }

    fn apply_history(
        &mut self,
        result: Result<HashMap<String, Vec<HistoricalPoint>>, ApiError>,
        now: OffsetDateTime,
    ) {
        match result {
            Ok(history) => {
                self.hourly = bucket_history(&history, now, self.ctx.hourly_view, self.ctx.display_offset);
                debug!(
                    "Bucketed {} gas series for device {}",
                    self.hourly.len(),
                    self.device.id
                );
            }
            Err(e) => {
                error!("Error fetching historical data for device {}: {}", self.device.id, e);
                self.hourly.clear();
                self.error = Some("Failed to fetch historical data. Please try again later.".to_string());
            }
        }
    }

    /// False once the device has been removed from the registry
    fn still_registered(&self) -> bool {
        self.registry.find(&self.device.id).is_some()
    }

    fn render(&self) {
        if let Some(error) = &self.error {
            warn!("[{} / {}] {}", self.device.id, self.device.position, error);
        }
        if self.readings.is_empty() {
            info!("[{} / {}] No sensor data available", self.device.id, self.device.position);
            return;
        }

        for reading in &self.readings {
            let recent = self.trend(&reading.gas_name, TrendView::Recent);
            let hourly = self.trend(&reading.gas_name, TrendView::Hourly);
            let hour_peak = hourly.iter().map(|p| p.ppm).fold(0.0_f64, f64::max);
            info!(
                "[{} / {}] {}: {} ppm (recent points: {}, last hour peak: {})",
                self.device.id,
                self.device.position,
                reading.gas_name,
                format_ppm(reading.ppm),
                recent.len(),
                format_ppm(hour_peak)
            );
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Opening device view for {} ({})", self.device.id, self.device.position);

        let (tx, mut rx) = mpsc::unbounded_channel::<Completion<DetailFetch>>();
        let mut live_timer = poll_timer(self.ctx.intervals.live);
        let mut history_timer = poll_timer(self.ctx.intervals.history);

        loop {
            tokio::select! {
                _ = live_timer.tick() => {
                    let api = self.ctx.api.clone();
                    let device_id = self.device.id.clone();
                    self.live_requests.spawn(&tx, async move {
                        DetailFetch::Live(api.latest_readings(&device_id).await)
                    });
                }
                _ = history_timer.tick() => {
                    let api = self.ctx.api.clone();
                    let device_id = self.device.id.clone();
                    self.history_requests.spawn(&tx, async move {
                        DetailFetch::History(api.historical_data(&device_id).await)
                    });
                }
                Some(done) = rx.recv() => {
                    let now = OffsetDateTime::now_utc();
                    match done.result {
                        DetailFetch::Live(result) => {
                            if self.live_requests.accept(done.id) {
                                self.apply_live(result, now);
                                self.render();
                            }
                        }
                        DetailFetch::History(result) => {
                            if self.history_requests.accept(done.id) {
                                self.apply_history(result, now);
                            }
                        }
                    }
                }
                event = self.store_events.recv() => {
                    let relevant = match event {
                        Ok(event) => event.key == DEVICES_KEY,
                        Err(RecvError::Lagged(_)) => true,
                        Err(RecvError::Closed) => false,
                    };
                    if relevant && !self.still_registered() {
                        info!("Device {} was unregistered", self.device.id);
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        self.live_requests.cancel();
        self.history_requests.cancel();
        info!("Closed device view for {}", self.device.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::context;
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2024-06-01 09:15:30 UTC);

    fn view() -> DeviceDetailView {
        let (ctx, _) = context();
        DeviceDetailView::for_device(
            ctx,
            Device {
                id: "dev-1".into(),
                position: "Hall".into(),
            },
        )
    }

    fn reading(gas: &str, ppm: f64) -> SensorReading {
        SensorReading {
            gas_name: gas.into(),
            ppm,
            timestamp: Some(NOW),
        }
    }

    #[test]
    fn live_readings_feed_capped_trends() {
        let mut view = view();

        for i in 0..20 {
            let now = NOW + Duration::seconds(5 * i);
            view.apply_live(Ok(vec![reading("CO", i as f64), reading("H2", 1.0)]), now);
        }

        let co = view.trend("CO", TrendView::Recent);
        assert_eq!(co.len(), DETAIL_TREND_CAPACITY);
        assert_eq!(co.last().unwrap().ppm, 19.0);
        assert_eq!(co.last().unwrap().time, "09:17:05");
        assert_eq!(view.readings().len(), 2);
        assert!(view.error().is_none());
    }

    #[test]
    fn empty_live_payload_keeps_previous_state() {
        let mut view = view();
        view.apply_live(Ok(vec![reading("CO", 2.0)]), NOW);
        view.apply_live(Ok(Vec::new()), NOW);

        assert_eq!(view.readings().len(), 1);
        assert_eq!(view.trend("CO", TrendView::Recent).len(), 1);
    }

    #[test]
    fn failed_fetch_shows_error_and_clears_gauges() {
        let mut view = view();
        view.apply_live(Ok(vec![reading("CO", 2.0)]), NOW);
        view.apply_live(Err(ApiError::Schema("boom".into())), NOW);

        assert!(view.readings().is_empty());
        assert!(view.error().is_some());
        assert_eq!(view.trend("CO", TrendView::Recent).len(), 1);
    }

    #[test]
    fn hourly_trend_uses_canonical_names() {
        let mut view = view();

        let mut history = HashMap::new();
        history.insert(
            "DUST CONCENTRATION".to_string(),
            vec![HistoricalPoint {
                at: NOW - Duration::seconds(10),
                ppm: 8.0,
            }],
        );
        view.apply_history(Ok(history), NOW);

        let hourly = view.trend("Dust Concentrati", TrendView::Hourly);
        assert_eq!(hourly.len(), 60);
        assert_eq!(hourly[59].ppm, 8.0);
        assert_eq!(hourly[59].time, "09:15");

        view.apply_history(Err(ApiError::Schema("down".into())), NOW);
        assert!(view.trend("DUST CONCENTRATION", TrendView::Hourly).is_empty());
    }

    #[tokio::test]
    async fn unreachable_backend_fails_validation() {
        let (ctx, store) = context();
        let registry = DeviceRegistry::new(store);
        registry.add("dev-1", "Hall").unwrap();

        let result = DeviceDetailView::open(ctx, &registry, "dev-1").await;
        assert!(matches!(result, Err(AccessError::Api(_))));
    }

    #[tokio::test]
    async fn open_retries_until_shutdown_while_backend_is_down() {
        let (ctx, store) = context();
        let registry = DeviceRegistry::new(store);
        registry.add("dev-1", "Hall").unwrap();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let opening = tokio::spawn(async move {
            DeviceDetailView::open_when_ready(
                ctx,
                &registry,
                "dev-1",
                std::time::Duration::from_millis(20),
                &mut stop_rx,
            )
            .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!opening.is_finished());

        stop_tx.send(true).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(2), opening)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn run_stops_when_device_is_unregistered() {
        let (ctx, store) = context();
        let registry = DeviceRegistry::new(store);
        let device = registry.add("dev-1", "Hall").unwrap();
        let view = DeviceDetailView::for_device(ctx, device);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(view.run(stop_rx));
        registry.add("dev-2", "Lab").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        registry.remove("dev-1").unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let view = view();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(view.run(stop_rx));
        stop_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
