//! Trading Types
//!
//! Types for virtual stock trading:
//! - Users and wallet balances
//! - Portfolio positions (one row per user per symbol)
//! - Trade records (immutable execution log)
//! - Leaderboard entries
//! - Wallet transactions

use serde::{Deserialize, Serialize};

/// Balance granted to every new account, and assumed when a user has no
/// balance row yet.
pub const STARTING_BALANCE: f64 = 10_000.0;

/// Order type recorded on every trade. Only market orders are executed.
pub const MARKET_ORDER: &str = "market";

/// Status recorded on every trade written by settlement.
pub const TRADE_EXECUTED: &str = "executed";

/// Round a monetary amount to cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

// =============================================================================
// Trade Side
// =============================================================================

/// Trade side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    /// Parse a side stored in the database.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Users
// =============================================================================

/// A trading account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    /// Internal user ID (referenced by positions, trades, leaderboard)
    pub id: String,
    /// External auth identity this account belongs to
    pub auth_user_id: String,
    pub email: String,
    pub username: String,
    /// Cash available for trading
    pub wallet_balance: f64,
    /// Wallet balance plus the current value of all positions
    pub total_portfolio_value: f64,
    /// When the account was created (ms)
    pub created_at: i64,
    /// Last modification (ms)
    pub updated_at: i64,
}

impl UserAccount {
    /// Create a new account funded with the starting balance.
    pub fn new(auth_user_id: String, email: String, username: String, starting_balance: f64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            auth_user_id,
            email,
            username,
            wallet_balance: starting_balance,
            total_portfolio_value: starting_balance,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Balance figures for a user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBalance {
    pub wallet_balance: f64,
    pub total_portfolio_value: f64,
}

impl UserBalance {
    /// Balance assumed for a user without a stored balance row.
    ///
    /// Total portfolio value is 0 because nothing has been computed yet.
    pub fn default_for_missing(starting_balance: f64) -> Self {
        Self {
            wallet_balance: starting_balance,
            total_portfolio_value: 0.0,
        }
    }
}

// =============================================================================
// Positions
// =============================================================================

/// A user's holding in one symbol.
///
/// Rows are never deleted: a fully sold position stays at zero quantity so
/// its realized P&L remains visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    /// Shares held
    pub quantity: i64,
    /// Weighted-average cost per share
    pub average_buy_price: f64,
    /// Cost basis of the shares still held
    pub total_invested: f64,
    /// Quantity marked at the last trade price
    pub current_value: f64,
    /// (last price - average cost) x quantity
    pub unrealized_pnl: f64,
    /// Accumulated profit from sells
    pub realized_pnl: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Position {
    /// Open a position from a first buy.
    pub fn open(user_id: String, symbol: String, quantity: i64, price: f64, total: f64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            symbol,
            quantity,
            average_buy_price: price,
            total_invested: total,
            current_value: total,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether shares are currently held.
    pub fn is_open(&self) -> bool {
        self.quantity > 0
    }

    /// Add shares bought at `price` for `total`, re-weighting the average cost.
    pub fn apply_buy(&mut self, quantity: i64, price: f64, total: f64) {
        let new_quantity = self.quantity + quantity;
        let new_invested = self.total_invested + total;
        let new_average = new_invested / new_quantity as f64;

        self.quantity = new_quantity;
        self.total_invested = new_invested;
        self.average_buy_price = new_average;
        self.current_value = new_quantity as f64 * price;
        self.unrealized_pnl = (price - new_average) * new_quantity as f64;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Remove shares sold at `price`, accruing realized P&L at average cost.
    ///
    /// Returns the P&L realized by this sale. The average cost is unchanged.
    pub fn apply_sell(&mut self, quantity: i64, price: f64) -> f64 {
        let realized = (price - self.average_buy_price) * quantity as f64;

        if quantity >= self.quantity {
            self.quantity = 0;
            self.total_invested = 0.0;
            self.current_value = 0.0;
            self.unrealized_pnl = 0.0;
        } else {
            let remaining = self.quantity - quantity;
            self.quantity = remaining;
            self.total_invested = self.average_buy_price * remaining as f64;
            self.current_value = remaining as f64 * price;
            self.unrealized_pnl = (price - self.average_buy_price) * remaining as f64;
        }

        self.realized_pnl += realized;
        self.updated_at = chrono::Utc::now().timestamp_millis();
        realized
    }
}

// =============================================================================
// Trades
// =============================================================================

/// Input to settlement.
#[derive(Debug, Clone)]
pub struct TradeParams {
    /// Internal user ID
    pub user_id: String,
    pub symbol: String,
    /// Must be a positive whole number
    pub quantity: f64,
    /// Must be positive and finite
    pub price: f64,
    pub side: TradeSide,
    /// Repeated keys for the same user apply once
    pub idempotency_key: Option<String>,
}

/// Request body for executing a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTradeRequest {
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    #[serde(alias = "tradeType")]
    pub side: TradeSide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl ExecuteTradeRequest {
    /// Attach the authenticated user to build settlement input.
    pub fn into_params(self, user_id: String) -> TradeParams {
        TradeParams {
            user_id,
            symbol: self.symbol,
            quantity: self.quantity,
            price: self.price,
            side: self.side,
            idempotency_key: self.idempotency_key,
        }
    }
}

/// An executed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub quantity: i64,
    pub price_per_share: f64,
    /// quantity x price, rounded to cents
    pub total_amount: f64,
    pub trade_type: TradeSide,
    pub order_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: i64,
    pub executed_at: i64,
}

impl TradeRecord {
    pub fn market(
        user_id: String,
        symbol: String,
        quantity: i64,
        price: f64,
        total_amount: f64,
        side: TradeSide,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            symbol,
            quantity,
            price_per_share: price,
            total_amount,
            trade_type: side,
            order_type: MARKET_ORDER.to_string(),
            status: TRADE_EXECUTED.to_string(),
            idempotency_key,
            created_at: now,
            executed_at: now,
        }
    }
}

/// Outcome of a successful settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    pub trade: TradeRecord,
    /// Position after the trade (absent when replaying an idempotent request)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub wallet_balance: f64,
    pub total_portfolio_value: f64,
    /// True when the idempotency key matched an earlier trade
    #[serde(default)]
    pub replayed: bool,
}

// =============================================================================
// Leaderboard
// =============================================================================

/// Public ranking row, refreshed after every trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub username: String,
    pub portfolio_value: f64,
    /// Sum of realized and unrealized P&L across positions
    pub daily_change: f64,
    /// daily_change as a percentage of holdings value
    pub daily_change_percent: f64,
    /// 1-based rank by portfolio value (filled on read)
    #[serde(default)]
    pub rank: u32,
    pub last_updated: i64,
}

impl LeaderboardEntry {
    /// Build an entry from a user's positions and total portfolio value.
    pub fn compute(user_id: String, username: String, portfolio_value: f64, positions: &[Position]) -> Self {
        let holdings_value: f64 = positions.iter().map(|p| p.current_value).sum();
        let daily_change: f64 = positions
            .iter()
            .map(|p| p.realized_pnl + p.unrealized_pnl)
            .sum();
        let daily_change_percent = if holdings_value > 0.0 {
            daily_change / holdings_value * 100.0
        } else {
            0.0
        };

        Self {
            user_id,
            username,
            portfolio_value,
            daily_change,
            daily_change_percent,
            rank: 0,
            last_updated: chrono::Utc::now().timestamp_millis(),
        }
    }
}

// =============================================================================
// Wallet Transactions
// =============================================================================

/// Kind of wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    InitialGrant,
    TradeBuy,
    TradeSell,
}

impl WalletTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTransactionType::InitialGrant => "initial_grant",
            WalletTransactionType::TradeBuy => "trade_buy",
            WalletTransactionType::TradeSell => "trade_sell",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "initial_grant" => Some(WalletTransactionType::InitialGrant),
            "trade_buy" => Some(WalletTransactionType::TradeBuy),
            "trade_sell" => Some(WalletTransactionType::TradeSell),
            _ => None,
        }
    }
}

/// A signed movement of wallet cash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    /// Positive for credits, negative for debits
    pub amount: f64,
    pub transaction_type: WalletTransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Trade ID for trade movements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub created_at: i64,
}

impl WalletTransaction {
    pub fn new(
        user_id: String,
        amount: f64,
        transaction_type: WalletTransactionType,
        description: Option<String>,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            amount,
            transaction_type,
            description,
            reference_id,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Wallet movement recorded alongside a trade.
    pub fn for_trade(trade: &TradeRecord) -> Self {
        let (amount, transaction_type) = match trade.trade_type {
            TradeSide::Buy => (-trade.total_amount, WalletTransactionType::TradeBuy),
            TradeSide::Sell => (trade.total_amount, WalletTransactionType::TradeSell),
        };
        Self::new(
            trade.user_id.clone(),
            amount,
            transaction_type,
            Some(format!(
                "{} {} {} @ {:.2}",
                trade.trade_type, trade.quantity, trade.symbol, trade.price_per_share
            )),
            Some(trade.id.clone()),
        )
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Portfolio overview for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub wallet_balance: f64,
    /// Sum of position current values
    pub holdings_value: f64,
    /// wallet + holdings
    pub total_value: f64,
    /// Realized P&L across all positions, including closed ones
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    /// Positions with quantity > 0
    pub open_positions: u32,
    pub total_trades: u64,
    /// (total_value - starting balance) / starting balance x 100
    pub total_return_pct: f64,
}

impl PortfolioSummary {
    pub fn compute(wallet_balance: f64, positions: &[Position], total_trades: u64, starting_balance: f64) -> Self {
        let holdings_value: f64 = positions.iter().map(|p| p.current_value).sum();
        let total_value = wallet_balance + holdings_value;
        let total_return_pct = if starting_balance > 0.0 {
            (total_value - starting_balance) / starting_balance * 100.0
        } else {
            0.0
        };

        Self {
            wallet_balance,
            holdings_value,
            total_value,
            realized_pnl: positions.iter().map(|p| p.realized_pnl).sum(),
            unrealized_pnl: positions.iter().map(|p| p.unrealized_pnl).sum(),
            open_positions: positions.iter().filter(|p| p.is_open()).count() as u32,
            total_trades,
            total_return_pct,
        }
    }
}
