mod activity;
mod api;
mod config;
mod console;
mod error;
mod gas;
mod models;
mod poll;
mod store;
mod timestamp;
mod trend;
mod users;
mod utils;
mod views;

use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use api::ApiClient;
use config::DashboardConfig;
use console::{read_stdin_lines, Console};
use error::AccessError;
use store::{spawn_watcher, DeviceRegistry, FileStore, KeyValueStore, Session};
use users::UserDirectory;
use views::{DashboardView, DeviceDetailView, DevicesView, ViewContext};

/// The returned receiver resolves once `signal` fires. If listening fails it
/// never resolves.
fn forward_signal<F>(signal: F) -> oneshot::Receiver<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                let _tx = tx;
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

async fn run_views(
    config: DashboardConfig,
    ctx: ViewContext,
    session: Session,
    console_lines: mpsc::Receiver<String>,
    shutdown_tx: &watch::Sender<bool>,
) {
    let shutdown = shutdown_tx.subscribe();
    let (device_tx, device_rx) = mpsc::unbounded_channel();

    let dashboard = async {
        DashboardView::new(ctx.clone(), session.clone())
            .run(shutdown.clone())
            .await;
        // Dashboard closes when the session ends; take the other views down with it
        let _ = shutdown_tx.send(true);
    };

    let devices = async {
        // Device administration is an admin page
        if session.is_admin() {
            DevicesView::new(ctx.clone())
                .run(device_rx, shutdown.clone())
                .await;
        }
    };

    let console = Console::new(
        session.clone(),
        ctx.store.clone(),
        UserDirectory::new(ctx.api.clone()),
        session.is_admin().then_some(device_tx),
    )
    .run(console_lines, shutdown.clone());

    let detail = async {
        let device_id = match &config.device_id {
            Some(id) => id,
            None => return,
        };
        let registry = DeviceRegistry::new(ctx.store.clone());
        let mut shutdown = shutdown.clone();
        let retry = config.intervals.live;
        match DeviceDetailView::open_when_ready(ctx.clone(), &registry, device_id, retry, &mut shutdown).await {
            Ok(Some(view)) => view.run(shutdown).await,
            Ok(None) => {}
            Err(e) => error!("Cannot open device {}: {}", device_id, e),
        }
    };

    tokio::join!(dashboard, devices, detail, console);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match DashboardConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let file_store = Arc::new(FileStore::open(&config.store_path)?);
    let store: Arc<dyn KeyValueStore> = file_store.clone();

    let session = match Session::load(store.as_ref()) {
        Some(session) => session,
        None => {
            warn!(
                "No signed-in user in {}; sign in through the web client first",
                config.store_path.display()
            );
            return Err(AccessError::SignedOut.into());
        }
    };

    let api = ApiClient::new(&config.api_base_url, config.request_timeout)?;
    let ctx = ViewContext::new(&config, api, store);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = spawn_watcher(file_store, config.intervals.store_watch, shutdown_rx.clone());

    // Handle Ctrl+C gracefully
    let mut rx = forward_signal(tokio::signal::ctrl_c());

    info!("Starting air quality dashboard, type help for console commands");

    // Run the views or wait for shutdown signal
    let views = run_views(config, ctx, session, read_stdin_lines(), &shutdown_tx);
    tokio::pin!(views);
    tokio::select! {
        _ = &mut views => info!("Session ended"),
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
            let _ = shutdown_tx.send(true);
            views.await;
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = watcher.await {
        warn!("Store watcher ended abnormally: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_is_forwarded() {
        let rx = forward_signal(async { Ok(()) });
        let received = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap();
        assert!(received.is_ok());
    }

    #[tokio::test]
    async fn failed_signal_listener_does_not_trigger_shutdown() {
        let rx = forward_signal(async {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler"))
        });
        assert!(tokio::time::timeout(Duration::from_millis(100), rx).await.is_err());
    }
}
