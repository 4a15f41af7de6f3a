//! Trading Service
//!
//! Settles market trades against a user's virtual wallet:
//! - Validates the request and checks funds or held shares
//! - Updates the wallet and the per-symbol position
//! - Appends the trade and its wallet transaction
//! - Refreshes total portfolio value and the leaderboard row
//!
//! A settlement is one SQLite transaction, so either every write lands or
//! none does.

use crate::services::SqliteStore;
use crate::types::{
    round_cents, LeaderboardEntry, PortfolioSummary, Position, SettlementResult, TradeParams,
    TradeRecord, TradeSide, UserBalance, WalletTransaction, STARTING_BALANCE,
};
use rusqlite::Connection;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Username shown on the leaderboard when the account has none.
const DEFAULT_USERNAME: &str = "Trader";

/// Trading service errors.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: i64, held: i64 },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<rusqlite::Error> for TradingError {
    fn from(e: rusqlite::Error) -> Self {
        TradingError::DatabaseError(e.to_string())
    }
}

/// Validated settlement input.
struct ValidTrade {
    symbol: String,
    quantity: i64,
    price: f64,
    total: f64,
}

fn validate(params: &TradeParams) -> Result<ValidTrade, TradingError> {
    let symbol = params.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(TradingError::InvalidTrade("symbol is required".to_string()));
    }
    if !params.price.is_finite() || params.price <= 0.0 {
        return Err(TradingError::InvalidTrade(
            "price must be a positive number".to_string(),
        ));
    }
    let q = params.quantity;
    if !q.is_finite() || q <= 0.0 || q.fract() != 0.0 || q > i64::MAX as f64 {
        return Err(TradingError::InvalidTrade(
            "quantity must be a positive whole number".to_string(),
        ));
    }

    let quantity = q as i64;
    Ok(ValidTrade {
        symbol,
        quantity,
        price: params.price,
        total: round_cents(quantity as f64 * params.price),
    })
}

/// Virtual trading service.
#[derive(Clone)]
pub struct TradingService {
    sqlite: Arc<SqliteStore>,
    /// Balance assumed for users without a balance row
    starting_balance: f64,
}

impl TradingService {
    /// Create a new trading service.
    pub fn new(sqlite: Arc<SqliteStore>) -> Self {
        Self::with_config(sqlite, STARTING_BALANCE)
    }

    /// Create a trading service with a custom starting balance.
    pub fn with_config(sqlite: Arc<SqliteStore>, starting_balance: f64) -> Self {
        Self {
            sqlite,
            starting_balance,
        }
    }

    pub fn starting_balance(&self) -> f64 {
        self.starting_balance
    }

    // ========== Settlement ==========

    /// Execute a market trade at the given price.
    pub fn execute_trade(&self, params: TradeParams) -> Result<SettlementResult, TradingError> {
        let trade = validate(&params)?;

        let result = self
            .sqlite
            .with_transaction(|conn| settle(conn, &params, &trade))
            .map_err(|e| {
                debug!("Trade rejected for {}: {}", params.user_id, e);
                e
            })?;

        if result.replayed {
            info!(
                "Replayed trade {} for {} (idempotency key reused)",
                result.trade.id, params.user_id
            );
        } else {
            info!(
                "Executed {} {} {} @ {:.2} for {} (wallet {:.2})",
                result.trade.trade_type,
                result.trade.quantity,
                result.trade.symbol,
                result.trade.price_per_share,
                params.user_id,
                result.wallet_balance
            );
        }

        Ok(result)
    }

    // ========== Reads ==========

    /// Wallet balance and total value, defaulting when no row exists.
    pub fn get_user_balance(&self, user_id: &str) -> UserBalance {
        match self.sqlite.get_balance(user_id) {
            Ok(Some(balance)) => balance,
            Ok(None) => UserBalance::default_for_missing(self.starting_balance),
            Err(e) => {
                warn!("Failed to read balance for {}: {}", user_id, e);
                UserBalance::default_for_missing(self.starting_balance)
            }
        }
    }

    /// All positions, including fully sold ones.
    pub fn get_positions(&self, user_id: &str) -> Vec<Position> {
        self.sqlite.get_positions(user_id)
    }

    /// Trade history, newest first.
    pub fn get_trade_history(&self, user_id: &str, limit: usize) -> Vec<TradeRecord> {
        self.sqlite.get_trades(user_id, limit)
    }

    pub fn get_leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.sqlite.get_leaderboard(limit)
    }

    pub fn get_wallet_transactions(&self, user_id: &str, limit: usize) -> Vec<WalletTransaction> {
        self.sqlite.get_wallet_transactions(user_id, limit)
    }

    /// Dashboard summary computed from the stored positions.
    pub fn get_portfolio_summary(&self, user_id: &str) -> PortfolioSummary {
        let balance = self.get_user_balance(user_id);
        let positions = self.get_positions(user_id);
        let total_trades = self.sqlite.trade_count(user_id);
        PortfolioSummary::compute(
            balance.wallet_balance,
            &positions,
            total_trades,
            self.starting_balance,
        )
    }
}

/// Apply one trade inside an open transaction.
fn settle(conn: &Connection, params: &TradeParams, trade: &ValidTrade) -> Result<SettlementResult, TradingError> {
    let user = SqliteStore::user_in(conn, &params.user_id)?
        .ok_or_else(|| TradingError::UserNotFound(params.user_id.clone()))?;

    if let Some(key) = params.idempotency_key.as_deref() {
        if let Some(existing) = SqliteStore::trade_by_key(conn, &user.id, key)? {
            return Ok(SettlementResult {
                trade: existing,
                position: None,
                wallet_balance: user.wallet_balance,
                total_portfolio_value: user.total_portfolio_value,
                replayed: true,
            });
        }
    }

    let existing = SqliteStore::position_in(conn, &user.id, &trade.symbol)?;

    let (position, wallet_balance) = match params.side {
        TradeSide::Buy => {
            if user.wallet_balance < trade.total {
                return Err(TradingError::InsufficientFunds {
                    needed: trade.total,
                    available: user.wallet_balance,
                });
            }
            let position = match existing {
                Some(mut position) => {
                    position.apply_buy(trade.quantity, trade.price, trade.total);
                    SqliteStore::update_position(conn, &position)?;
                    position
                }
                None => {
                    let position = Position::open(
                        user.id.clone(),
                        trade.symbol.clone(),
                        trade.quantity,
                        trade.price,
                        trade.total,
                    );
                    SqliteStore::insert_position(conn, &position)?;
                    position
                }
            };
            (position, round_cents(user.wallet_balance - trade.total))
        }
        TradeSide::Sell => {
            let held = existing.as_ref().map(|p| p.quantity).unwrap_or(0);
            let mut position = match existing {
                Some(position) if held >= trade.quantity => position,
                _ => {
                    return Err(TradingError::InsufficientShares {
                        requested: trade.quantity,
                        held,
                    })
                }
            };
            position.apply_sell(trade.quantity, trade.price);
            SqliteStore::update_position(conn, &position)?;
            (position, round_cents(user.wallet_balance + trade.total))
        }
    };

    SqliteStore::update_wallet_balance(conn, &user.id, wallet_balance)?;

    let record = TradeRecord::market(
        user.id.clone(),
        trade.symbol.clone(),
        trade.quantity,
        trade.price,
        trade.total,
        params.side,
        params.idempotency_key.clone(),
    );
    SqliteStore::insert_trade(conn, &record)?;
    SqliteStore::insert_wallet_transaction(conn, &WalletTransaction::for_trade(&record))?;

    let positions = SqliteStore::positions_in(conn, &user.id)?;
    let holdings: f64 = positions.iter().map(|p| p.current_value).sum();
    let total_portfolio_value = wallet_balance + holdings;
    SqliteStore::update_portfolio_value(conn, &user.id, total_portfolio_value)?;

    let username = if user.username.trim().is_empty() {
        DEFAULT_USERNAME.to_string()
    } else {
        user.username.clone()
    };
    let entry = LeaderboardEntry::compute(user.id.clone(), username, total_portfolio_value, &positions);
    SqliteStore::upsert_leaderboard(conn, &entry)?;

    Ok(SettlementResult {
        trade: record,
        position: Some(position),
        wallet_balance,
        total_portfolio_value,
        replayed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(quantity: f64, price: f64) -> TradeParams {
        TradeParams {
            user_id: "user-1".to_string(),
            symbol: "aapl".to_string(),
            quantity,
            price,
            side: TradeSide::Buy,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_validate_normalizes_symbol_and_total() {
        let trade = validate(&params(3.0, 33.333)).unwrap();
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.quantity, 3);
        assert_eq!(trade.total, 100.0);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(matches!(validate(&params(0.0, 10.0)), Err(TradingError::InvalidTrade(_))));
        assert!(matches!(validate(&params(-1.0, 10.0)), Err(TradingError::InvalidTrade(_))));
        assert!(matches!(validate(&params(1.5, 10.0)), Err(TradingError::InvalidTrade(_))));
        assert!(matches!(validate(&params(1.0, 0.0)), Err(TradingError::InvalidTrade(_))));
        assert!(matches!(validate(&params(1.0, f64::NAN)), Err(TradingError::InvalidTrade(_))));
        assert!(matches!(validate(&params(1.0, f64::INFINITY)), Err(TradingError::InvalidTrade(_))));

        let mut blank = params(1.0, 10.0);
        blank.symbol = "  ".to_string();
        assert!(matches!(validate(&blank), Err(TradingError::InvalidTrade(_))));
    }

    #[test]
    fn test_missing_balance_defaults_without_persisting() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let service = TradingService::new(store.clone());

        let balance = service.get_user_balance("ghost");
        assert_eq!(balance.wallet_balance, STARTING_BALANCE);
        assert_eq!(balance.total_portfolio_value, 0.0);
        assert!(store.get_balance("ghost").unwrap().is_none());
    }

    #[test]
    fn test_unknown_user_rejected() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let service = TradingService::new(store);

        let result = service.execute_trade(params(1.0, 10.0));
        assert!(matches!(result, Err(TradingError::UserNotFound(_))));
    }
}
