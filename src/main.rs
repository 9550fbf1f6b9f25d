use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use taskboard_hub::config::Settings;
use taskboard_hub::hub::Hub;
use taskboard_hub::server::{create_app, AppState};
use taskboard_hub::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // Start the hub router
    let (hub, router_handle) = Hub::spawn(&settings.hub);
    tracing::info!(
        router_queue_capacity = settings.hub.router_queue_capacity,
        session_queue_capacity = settings.hub.session_queue_capacity,
        delivery_policy = ?settings.hub.delivery_policy,
        "Hub started"
    );

    // Create Axum app
    let addr = settings.server_addr();
    let state = AppState::new(settings, hub.clone());
    let app = create_app(state);

    // Start server
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    // Wait for the router to close every session queue
    if let Err(e) = router_handle.await {
        tracing::error!(error = %e, "Hub router task failed");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal(hub: Hub) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop accepting registrations and close open sessions so upgraded
    // connections finish before the server drains.
    hub.shutdown();
}
