use point_market::config::Config;
use point_market::services::SqliteStore;
use point_market::{app, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "point_market=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!("Starting Point Market server on {}:{}", config.host, config.port);

    let sqlite = Arc::new(SqliteStore::new(&config.database_path)?);
    info!(
        "Database {} opened ({} accounts)",
        config.database_path,
        sqlite.user_count()
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, sqlite);
    state.start();

    // Expire stale sessions
    {
        let auth_service = state.auth_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                auth_service.cleanup_expired();
                debug!("{} active sessions", auth_service.session_count());
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Point Market server listening on {}", addr);

    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    state.shutdown();
    Ok(())
}
