use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};
use water_tracker::{AppConfig, AppState, LocalStore, backend::build_backend, config::BackendKind, router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is the normal case in production.
    let _ = dotenvy::dotenv();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = AppConfig::from_env();
    let backend = build_backend(&config.backend)?;
    let local = LocalStore::open(config.local_data_path.clone()).await;
    info!(
        backend = backend_label(&config),
        local_data = %local.path().display(),
        "starting water tracker"
    );

    let state = AppState::new(backend, local);
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

fn backend_label(config: &AppConfig) -> &'static str {
    match &config.backend {
        BackendKind::Supabase(Some(_)) => "supabase",
        BackendKind::Supabase(None) => "supabase (unconfigured)",
        BackendKind::Memory { .. } => "memory",
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
