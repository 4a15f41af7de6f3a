use crate::types::StreamStatus;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    stream: StreamStatus,
    quotes_configured: bool,
    websocket_clients: usize,
    watched_symbols: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        stream: state.price_feed.stream_status(),
        quotes_configured: state.market_data.is_configured(),
        websocket_clients: state.room_manager.client_count(),
        watched_symbols: state.price_feed.watched().len(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok",
            version: "1.0.0",
            stream: StreamStatus::Idle,
            quotes_configured: false,
            websocket_clients: 0,
            watched_symbols: 0,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"stream\":\"idle\""));
        assert!(json.contains("\"quotesConfigured\":false"));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let state = crate::AppState::in_memory().unwrap();
        let Json(response) = health(State(state)).await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
        assert!(!response.quotes_configured);
    }
}
