use railwatch::monitor::{MonitorSettings, spawn_ingest_loop, spawn_monitor_loop};
use railwatch::{api, config, feed, store};
use std::net::SocketAddr;
use std::sync::Arc;

fn init_tracing(level: &str) {
    let level = level.parse().unwrap_or(tracing::Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        "railwatch starting"
    );

    // No store means nothing to schedule; bail before any loop starts.
    let database_url = config.database_url()?;
    let store = store::Store::connect(&database_url, config.max_connections()).await?;
    store.init_schema().await?;
    tracing::info!("store ready");

    let settings = MonitorSettings::from_config(&config)?;
    let interval = config.cycle_interval();

    let _ingest_handle = match config.replay_path() {
        Some(path) => {
            tracing::info!(path, "starting ingestion from replay feed");
            Some(spawn_ingest_loop(
                feed::replay::ReplayFeed::new(path),
                store.clone(),
                interval,
            ))
        }
        None => {
            tracing::warn!("no feed source configured - ingestion disabled");
            None
        }
    };

    let _monitor_handle = spawn_monitor_loop(store.clone(), settings.clone(), interval);

    let context = Arc::new(api::ApiContext { store, settings });
    let app = api::router(context);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
