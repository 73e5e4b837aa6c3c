use mural_service::{
    DefaultAppState,
    backend::Backend,
    config::ServiceConfig,
    create_app,
    services::ReadContext,
    shutdown::{GracefulShutdownLayer, ShutdownState},
};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mural_service=debug")),
        )
        .init();

    let config = ServiceConfig::from_env().unwrap_or_else(|err| {
        error!(error = %err, "Invalid configuration");
        std::process::exit(1);
    });

    let backend = Backend::connect(&config).await.unwrap_or_else(|err| {
        error!(error = %err, "Failed to set up the content backend");
        std::process::exit(1);
    });

    let shutdown_state = ShutdownState::new();
    let reads = ReadContext::new(config.retry, shutdown_state.token());
    let served_storage = backend.served_storage.clone();
    let app_state = DefaultAppState::new(backend, reads);

    let app = create_app(app_state, served_storage).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(GracefulShutdownLayer::new(shutdown_state.clone()))
            .layer(TimeoutLayer::new(config.request_timeout)),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .unwrap_or_else(|err| {
            error!(bind_address = %config.bind_addr, error = %err, "Failed to bind to address");
            std::process::exit(1);
        });

    info!(bind_address = %config.bind_addr, "Server running");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_state));

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal(shutdown_state: ShutdownState) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
    shutdown_state.start_shutdown();

    shutdown_state.completed().await;
    info!("Graceful shutdown completed - all requests finished");
}
