use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deck2pdf::{AppState, Args, build_router};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deck2pdf=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();
    let settings = args.settings();

    let state = Arc::new(AppState::new(settings.clone()));
    let background = state.start_background();

    let app = build_router(Arc::clone(&state));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!("deck2pdf listening on {}", addr);
    tracing::info!("Conversion engine: {}", settings.engine.display());
    tracing::info!("Workspace root: {}", settings.workspace_root.display());
    tracing::info!(
        "Rate limits: {} / {} requests per {} seconds (api / convert)",
        settings.api_tier.max_requests,
        settings.convert_tier.max_requests,
        settings.api_tier.window.as_secs()
    );

    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    background.shutdown();
    if let Err(e) = served {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
    tracing::info!("Server exited gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
