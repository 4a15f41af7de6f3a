//! Market data API
//!
//! Public endpoints for quotes, profiles, search and the live price store.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::ApiResponse;
use crate::error::{AppError, Result};
use crate::sources::finnhub::DEFAULT_POPULAR_LIMIT;
use crate::types::{
    CompanyProfile, MarketStatus, MarketSymbol, PriceSnapshot, StockListing, StockQuote,
    SymbolMatch,
};
use crate::AppState;

/// Create market router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quote/:symbol", get(get_quote))
        .route("/profile/:symbol", get(get_profile))
        .route("/popular", get(get_popular))
        .route("/search", get(search))
        .route("/symbols", get(get_symbols))
        .route("/status", get(get_status))
        .route("/prices", get(get_prices))
        .route("/stocks", get(get_cached_stocks))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    /// Comma-separated symbols
    #[serde(default)]
    pub symbols: String,
}

/// GET /api/market/quote/:symbol
async fn get_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<StockQuote>>> {
    let quote = state
        .market_data
        .quote(&symbol)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No quote for {}", symbol.to_uppercase())))?;
    Ok(Json(ApiResponse { data: quote }))
}

/// GET /api/market/profile/:symbol
async fn get_profile(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<CompanyProfile>>> {
    let profile = state
        .market_data
        .profile(&symbol)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No profile for {}", symbol.to_uppercase())))?;
    Ok(Json(ApiResponse { data: profile }))
}

/// GET /api/market/popular?limit=
async fn get_popular(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<StockQuote>>> {
    let limit = query.limit.unwrap_or(DEFAULT_POPULAR_LIMIT);
    let quotes = state.market_data.popular(limit).await;
    Json(ApiResponse { data: quotes })
}

/// GET /api/market/search?q=
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<ApiResponse<Vec<SymbolMatch>>> {
    let matches = state.market_data.search(&query.q).await;
    Json(ApiResponse { data: matches })
}

/// GET /api/market/symbols?limit=
async fn get_symbols(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<MarketSymbol>>> {
    let symbols = state.market_data.symbols(query.limit).await;
    Json(ApiResponse { data: symbols })
}

/// GET /api/market/status
async fn get_status(State(state): State<AppState>) -> Result<Json<ApiResponse<MarketStatus>>> {
    let status = state.market_data.market_status().await?;
    Ok(Json(ApiResponse { data: status }))
}

/// GET /api/market/prices?symbols=AAPL,MSFT
///
/// Latest streamed, simulated or polled prices.
async fn get_prices(
    State(state): State<AppState>,
    Query(query): Query<PricesQuery>,
) -> Result<Json<ApiResponse<Vec<PriceSnapshot>>>> {
    let symbols: Vec<String> = query
        .symbols
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if symbols.is_empty() {
        return Err(AppError::BadRequest("symbols is required".to_string()));
    }

    let prices = state.price_feed.snapshot(&symbols);
    Ok(Json(ApiResponse { data: prices }))
}

/// GET /api/market/stocks
///
/// Last cached quote for every stock seen so far.
async fn get_cached_stocks(State(state): State<AppState>) -> Json<ApiResponse<Vec<StockListing>>> {
    Json(ApiResponse {
        data: state.market_data.cached_stocks(),
    })
}
