use mongodb_gateway::api::{router, AppState};
use mongodb_gateway::config::Config;
use mongodb_gateway::driver::MongoDriver;
use mongodb_gateway::pool::ConnectionRegistry;
use mongodb_gateway::registry::{FileExtrasStore, ServiceStore};
use mongodb_gateway::schema::MemoryTableCache;
use mongodb_gateway::service::{ConnectionConfigurator, ServiceContext, ServiceManager};

use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "/var/log/mongodb-gateway".to_string());

    std::fs::create_dir_all(&log_dir).unwrap_or_else(|e| {
        eprintln!("Warning: Could not create log directory {}: {}", log_dir, e);
    });

    // Daily rotated JSON file next to console output
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "mongodb-gateway.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mongodb_gateway=debug")),
        )
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .init();

    debug!("Logging initialized - log directory: {}", log_dir);

    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file found or error loading it: {}", e);
    }

    let config = Config::from_env()?;
    let socket_addr = config.socket_addr()?;

    info!("Starting MongoDB Gateway on {}", socket_addr);
    info!("Data directory: {}", config.data_dir.display());
    info!("Schema sample size: {}", config.schema_sample_size);
    info!("Max records per read: {}", config.max_records);
    info!("Lookup keys: {}", config.lookups.len());

    std::fs::create_dir_all(&config.data_dir)?;

    let registry = Arc::new(ConnectionRegistry::new(Arc::new(MongoDriver::new())));
    let context = Arc::new(ServiceContext {
        configurator: ConnectionConfigurator::new(registry.clone(), config.lookups.clone()),
        cache: Arc::new(MemoryTableCache::new()),
        extras: Arc::new(FileExtrasStore::new(&config.data_dir)),
        sample_size: config.schema_sample_size,
    });

    let manager = Arc::new(ServiceManager::new(
        context,
        Some(ServiceStore::new(&config.data_dir)),
    ));

    let restored = manager.restore().await?;
    info!("{} services active after restore", restored);

    let state = Arc::new(AppState::new(manager.clone(), config.max_records));
    let app = router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&socket_addr).await?;
    info!("Server listening on {}", socket_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    let closed = registry.close_all().await;
    info!("Server shutdown complete, {} connections closed", closed);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Received shutdown signal");
}
