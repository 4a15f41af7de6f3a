//! HTTP API tests
//!
//! Requests go through the full router over an in-memory database, with no
//! quote provider configured.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use point_market::{app, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    app(AppState::in_memory().unwrap())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn sign_up(app: &Router, email: &str, username: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/auth/signup",
            None,
            json!({ "email": email, "password": "secret1", "username": username }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["data"]["sessionToken"].as_str().unwrap().to_string()
}

// =============================================================================
// Health
// =============================================================================

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_stream_state() {
        let app = test_app();
        let (status, body) = send(&app, get("/api/health", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["quotesConfigured"], false);
        assert_eq!(body["websocketClients"], 0);
    }
}

// =============================================================================
// Auth
// =============================================================================

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_signup_then_me() {
        let app = test_app();
        let token = sign_up(&app, "Alice@Example.com", "alice").await;

        let (status, body) = send(&app, get("/api/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "alice@example.com");
        assert_eq!(body["data"]["username"], "alice");
        assert_eq!(body["data"]["walletBalance"], 10_000.0);
    }

    #[tokio::test]
    async fn test_duplicate_signup_conflicts() {
        let app = test_app();
        sign_up(&app, "bob@example.com", "bob").await;

        let (status, body) = send(
            &app,
            post_json(
                "/api/auth/signup",
                None,
                json!({ "email": "bob@example.com", "password": "secret1", "username": "bobby" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["code"].is_string());
    }

    #[tokio::test]
    async fn test_signin_with_wrong_password() {
        let app = test_app();
        sign_up(&app, "carol@example.com", "carol").await;

        let (status, _) = send(
            &app,
            post_json(
                "/api/auth/signin",
                None,
                json!({ "email": "carol@example.com", "password": "wrong-pass" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            post_json(
                "/api/auth/signin",
                None,
                json!({ "email": "carol@example.com", "password": "secret1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["sessionToken"].is_string());
    }

    #[tokio::test]
    async fn test_signout_invalidates_token() {
        let app = test_app();
        let token = sign_up(&app, "dave@example.com", "dave").await;

        let (status, body) = send(&app, post_json("/api/auth/signout", Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["signedOut"], true);

        let (status, _) = send(&app, get("/api/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// Trading
// =============================================================================

mod trading_tests {
    use super::*;

    #[tokio::test]
    async fn test_trading_requires_auth() {
        let app = test_app();

        let (status, body) = send(&app, get("/api/trading/portfolio", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = send(
            &app,
            post_json(
                "/api/trading/trades",
                Some("not-a-session"),
                json!({ "symbol": "AAPL", "quantity": 1, "price": 10.0, "side": "buy" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_buy_and_sell_flow() {
        let app = test_app();
        let token = sign_up(&app, "erin@example.com", "erin").await;

        let (status, body) = send(
            &app,
            post_json(
                "/api/trading/trades",
                Some(&token),
                json!({ "symbol": "aapl", "quantity": 10, "price": 100.0, "side": "buy" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["trade"]["symbol"], "AAPL");
        assert_eq!(body["data"]["walletBalance"], 9_000.0);

        let (status, body) = send(
            &app,
            post_json(
                "/api/trading/trades",
                Some(&token),
                json!({ "symbol": "AAPL", "quantity": 5, "price": 120.0, "tradeType": "sell" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);

        let (_, body) = send(&app, get("/api/trading/balance", Some(&token))).await;
        assert_eq!(body["data"]["walletBalance"], 9_600.0);
        assert_eq!(body["data"]["totalPortfolioValue"], 10_200.0);

        let (_, body) = send(&app, get("/api/trading/portfolio", Some(&token))).await;
        let positions = body["data"].as_array().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0]["quantity"], 5);
        assert_eq!(positions[0]["realizedPnl"], 100.0);

        let (_, body) = send(&app, get("/api/trading/trades", Some(&token))).await;
        let trades = body["data"].as_array().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0]["tradeType"], "sell");
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejected() {
        let app = test_app();
        let token = sign_up(&app, "frank@example.com", "frank").await;

        let (status, body) = send(
            &app,
            post_json(
                "/api/trading/trades",
                Some(&token),
                json!({ "symbol": "AAPL", "quantity": 1000, "price": 100.0, "side": "buy" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

        let (_, body) = send(&app, get("/api/trading/trades", Some(&token))).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_trade_replay() {
        let app = test_app();
        let token = sign_up(&app, "gina@example.com", "gina").await;
        let order = json!({
            "symbol": "MSFT",
            "quantity": 2,
            "price": 300.0,
            "side": "buy",
            "idempotencyKey": "order-42"
        });

        let (status, _) = send(&app, post_json("/api/trading/trades", Some(&token), order.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, post_json("/api/trading/trades", Some(&token), order)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["replayed"], true);

        let (_, body) = send(&app, get("/api/trading/balance", Some(&token))).await;
        assert_eq!(body["data"]["walletBalance"], 9_400.0);
    }

    #[tokio::test]
    async fn test_leaderboard_is_public_and_limited() {
        let app = test_app();
        for name in ["henry", "irene", "jack"] {
            sign_up(&app, &format!("{}@example.com", name), name).await;
        }

        let query = serde_urlencoded::to_string([("limit", "2")]).unwrap();
        let (status, body) = send(&app, get(&format!("/api/trading/leaderboard?{}", query), None)).await;
        assert_eq!(status, StatusCode::OK);

        let entries = body["data"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["rank"], 1);
        assert_eq!(entries[1]["rank"], 2);
        assert_eq!(entries[0]["portfolioValue"], 10_000.0);
    }
}

// =============================================================================
// Market
// =============================================================================

mod market_tests {
    use super::*;

    #[tokio::test]
    async fn test_prices_requires_symbols() {
        let app = test_app();
        let (status, body) = send(&app, get("/api/market/prices", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_prices_without_ticks_is_empty() {
        let app = test_app();
        let query = serde_urlencoded::to_string([("symbols", "AAPL,MSFT")]).unwrap();
        let (status, body) = send(&app, get(&format!("/api/market/prices?{}", query), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cached_stocks_start_empty() {
        let app = test_app();
        let (status, body) = send(&app, get("/api/market/stocks", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}
