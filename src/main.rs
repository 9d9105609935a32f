use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tally::app::{build_routers, AppParts};
use tally::config::AppConfig;
use tally::ingest::geo::GeoResolver;
use tally::storage::{self, EventStore};
use tokio::net::TcpListener;
use tokio::signal;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

#[derive(Parser)]
#[command(name = "tally", about = "Analytics ingestion and reporting service for the portfolio site")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    if let Err(msg) = config.validate() {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        database = config.database.as_ref().map(|db| db.path.display().to_string()),
        event_file = %config.storage.file_path.display(),
        "starting tally"
    );

    let store = Arc::new(EventStore::from_config(&config));

    // Keep the table at the same cap the file store enforces on append.
    if let Some(sqlite) = store.sqlite() {
        let backend = sqlite.clone();
        let max_events = store.max_events();
        let interval = config.retention.prune_interval_secs;
        tokio::spawn(async move {
            storage::retention::retention_loop(backend, max_events, interval).await;
        });
    }

    let geo = GeoResolver::new(&config.geo);
    if !config.geo.enabled {
        tracing::info!("geo lookup disabled");
    }

    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(config.rate_limit.per_second)
        .burst_size(config.rate_limit.burst_size)
        .finish()
        .ok_or("invalid rate limit configuration")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let routers = build_routers(AppParts {
        config,
        store,
        geo,
    });
    let app = routers
        .api
        .merge(routers.ingest.layer(GovernorLayer::new(governor_conf)));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
}
