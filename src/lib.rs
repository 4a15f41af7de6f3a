//! Point Market - virtual stock trading server

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;
pub mod websocket;

use axum::{routing::get, Router};
use config::Config;
use services::{AuthService, MarketDataService, PriceFeed, SqliteStore, TradingService};
use sources::{FinnhubClient, FinnhubWs};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use websocket::RoomManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sqlite: Arc<SqliteStore>,
    pub auth_service: Arc<AuthService>,
    pub trading_service: Arc<TradingService>,
    pub market_data: Arc<MarketDataService>,
    pub stream: FinnhubWs,
    pub price_feed: PriceFeed,
    pub room_manager: Arc<RoomManager>,
}

impl AppState {
    /// Wire up services. Nothing runs until [`AppState::start`].
    pub fn new(config: Config, sqlite: Arc<SqliteStore>) -> Self {
        let finnhub = config.finnhub_api_key.as_ref().map(|api_key| {
            info!("Finnhub API key found, enabling live quotes");
            Arc::new(FinnhubClient::with_base_url(
                api_key.clone(),
                config.finnhub_rest_url.clone(),
            ))
        });

        let market_data = Arc::new(MarketDataService::new(finnhub, sqlite.clone()));
        let stream = FinnhubWs::new(config.finnhub_api_key.clone(), config.stream_config());
        let price_feed = PriceFeed::new(stream.clone(), market_data.clone(), config.feed_config());

        let auth_service = Arc::new(AuthService::with_config(
            sqlite.clone(),
            config.starting_balance,
            config.session_ttl_ms(),
        ));
        let trading_service = Arc::new(TradingService::with_config(
            sqlite.clone(),
            config.starting_balance,
        ));

        Self {
            config: Arc::new(config),
            sqlite,
            auth_service,
            trading_service,
            market_data,
            stream,
            price_feed,
            room_manager: RoomManager::new(),
        }
    }

    /// State over an in-memory database with default configuration.
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let sqlite = Arc::new(SqliteStore::new_in_memory()?);
        Ok(Self::new(Config::default(), sqlite))
    }

    /// Start the quote stream, the price feed and WebSocket fan-out.
    pub fn start(&self) {
        self.stream.start();
        self.price_feed.start();
        websocket::spawn_fanout(&self.price_feed, self.room_manager.clone());
    }

    /// Stop background tasks.
    pub fn shutdown(&self) {
        self.price_feed.shutdown();
        self.stream.shutdown();
    }
}

/// Build the HTTP router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::router())
        .route("/ws", get(websocket::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
