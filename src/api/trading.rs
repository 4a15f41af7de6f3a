//! Virtual trading API
//!
//! Endpoints for trading with the virtual wallet:
//! - POST /api/trading/trades - Execute a market trade
//! - GET /api/trading/trades - Trade history (newest first)
//! - GET /api/trading/portfolio - Positions
//! - GET /api/trading/balance - Wallet balance and total value
//! - GET /api/trading/summary - Portfolio summary
//! - GET /api/trading/transactions - Wallet movements
//! - GET /api/trading/leaderboard - Public ranking

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::auth::Authenticated;
use super::ApiResponse;
use crate::services::TradingError;
use crate::types::{
    ExecuteTradeRequest, LeaderboardEntry, PortfolioSummary, Position, SettlementResult,
    TradeRecord, UserBalance, WalletTransaction,
};
use crate::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 100;
const MAX_HISTORY_LIMIT: usize = 1000;
const DEFAULT_LEADERBOARD_LIMIT: usize = 50;
const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Create trading router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trades", get(get_trades).post(execute_trade))
        .route("/portfolio", get(get_portfolio))
        .route("/balance", get(get_balance))
        .route("/summary", get(get_summary))
        .route("/transactions", get(get_transactions))
        .route("/leaderboard", get(get_leaderboard))
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Convert TradingError to HTTP response.
impl IntoResponse for TradingError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            TradingError::InvalidTrade(_) => (StatusCode::BAD_REQUEST, "INVALID_TRADE"),
            TradingError::InsufficientFunds { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS")
            }
            TradingError::InsufficientShares { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_SHARES")
            }
            TradingError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            TradingError::DatabaseError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

/// POST /api/trading/trades
///
/// Settle a market trade at the quoted price.
async fn execute_trade(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(request): Json<ExecuteTradeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SettlementResult>>), TradingError> {
    let params = request.into_params(auth.user_id().to_string());
    let result = state.trading_service.execute_trade(params)?;
    let status = if result.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ApiResponse { data: result })))
}

/// GET /api/trading/trades
async fn get_trades(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<TradeRecord>>> {
    let limit = query.resolve(DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
    let trades = state.trading_service.get_trade_history(auth.user_id(), limit);
    Json(ApiResponse { data: trades })
}

/// GET /api/trading/portfolio
///
/// Every position row, including fully sold ones.
async fn get_portfolio(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<Vec<Position>>> {
    let positions = state.trading_service.get_positions(auth.user_id());
    Json(ApiResponse { data: positions })
}

/// GET /api/trading/balance
async fn get_balance(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<UserBalance>> {
    let balance = state.trading_service.get_user_balance(auth.user_id());
    Json(ApiResponse { data: balance })
}

/// GET /api/trading/summary
async fn get_summary(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<PortfolioSummary>> {
    let summary = state.trading_service.get_portfolio_summary(auth.user_id());
    Json(ApiResponse { data: summary })
}

/// GET /api/trading/transactions
async fn get_transactions(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<WalletTransaction>>> {
    let limit = query.resolve(DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
    let transactions = state
        .trading_service
        .get_wallet_transactions(auth.user_id(), limit);
    Json(ApiResponse { data: transactions })
}

/// GET /api/trading/leaderboard
async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<LeaderboardEntry>>> {
    let limit = query.resolve(DEFAULT_LEADERBOARD_LIMIT, MAX_LEADERBOARD_LIMIT);
    let entries = state.trading_service.get_leaderboard(limit);
    Json(ApiResponse { data: entries })
}
