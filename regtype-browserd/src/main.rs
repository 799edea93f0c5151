mod api;
mod config;
mod discovery;
mod error;
mod mdns;
mod view;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::discovery::coordinator::DiscoveryCoordinator;
use crate::mdns::browser::MdnsBrowseSource;
use crate::view::ViewPresenter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("regtype_browserd=info"))
        )
        .init();

    tracing::info!("Starting regtype-browserd");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/regtype-browser/browserd.toml".to_string());

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    // Create mDNS daemon, optionally bound to one interface
    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;
    if let Some(interface) = &config.discovery.interface {
        mdns_daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        mdns_daemon
            .enable_interface(interface.as_str())
            .with_context(|| format!("Failed to enable interface {}", interface))?;
    }

    let cancel = CancellationToken::new();

    // Presenter task receives snapshots in publication order
    let (presentation_tx, presentation_rx) = mpsc::unbounded_channel();
    let (view_presenter, view_rx) = ViewPresenter::new(config.descriptions.clone());
    let presenter_cancel = cancel.clone();
    let presenter_handle = tokio::spawn(
        discovery::presenter::run(view_presenter, presentation_rx, presenter_cancel)
    );

    let source = MdnsBrowseSource::new(mdns_daemon.clone(), &config.discovery.services_type);
    let coordinator = DiscoveryCoordinator::new(source, config.discovery.clone(), presentation_tx);

    if config.discovery.autostart {
        coordinator
            .start()
            .await
            .context("Failed to start discovery")?;
    }

    let app_state = api::routes::AppState {
        coordinator: coordinator.clone(),
        view_rx,
    };
    let app = api::routes::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    coordinator.stop().await;
    cancel.cancel();

    let _ = tokio::join!(presenter_handle, server_handle);

    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
