use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mikansync_core::{
    config::LogFormat, load_config, validate_config, Collaborators, Library, MikanResolver,
    PassSettings, QBittorrentClient, Reconciler, RssFeedSource, RuntimeSettings, SettingsCell,
    SqliteLibrary,
};
use mikansync_server::{api::create_router, session, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("MIKANSYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(config.logging.format);
    info!(version = VERSION, "Starting mikansync");
    info!("Loaded configuration from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Database path: {:?}", config.database.path);
    info!("Work directory: {:?}", config.library.work_dir);

    // Runtime-mutable settings shared by the client, the passes and the API
    let settings = SettingsCell::new(RuntimeSettings::from_config(&config));
    if settings.snapshot().feed_url.is_none() {
        info!("No feed URL configured, announce passes idle until one is set");
    }

    // Create SQLite library
    let library: Arc<dyn Library> = Arc::new(
        SqliteLibrary::new(&config.database.path).context("Failed to open library database")?,
    );
    info!("Library initialized");

    // Create download client
    let qbittorrent = Arc::new(
        QBittorrentClient::new(settings.clone(), config.qbittorrent.timeout_secs)
            .context("Failed to create qBittorrent client")?,
    );
    info!("Initializing qBittorrent client at {}", config.qbittorrent.url);
    session::initial_login(&qbittorrent).await;

    // Create feed source and subject resolver
    let feed = Arc::new(RssFeedSource::new(&config.feed).context("Failed to create feed source")?);
    let resolver =
        Arc::new(MikanResolver::new(&config.feed).context("Failed to create subject resolver")?);

    let reconciler = Arc::new(Reconciler::new(
        Collaborators {
            client: qbittorrent.clone(),
            feed,
            resolver,
            library: library.clone(),
        },
        settings.clone(),
        PassSettings::from_config(&config),
    ));

    if config.reconciler.enabled {
        reconciler.start().await;
        info!("Reconciler started");
    } else {
        info!("Reconciler disabled in config, passes run only on demand");
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let watcher = session::spawn_credentials_watcher(
        &settings,
        qbittorrent.clone(),
        shutdown_tx.subscribe(),
    );

    // Create app state
    let state = Arc::new(
        AppState::new(config.clone(), settings, reconciler.clone(), library)
            .with_qbittorrent(qbittorrent),
    );

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    let _ = shutdown_tx.send(());
    let _ = watcher.await;

    if reconciler.is_running() {
        info!("Stopping reconciler...");
        reconciler.stop().await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
