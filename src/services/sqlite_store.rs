//! SQLite persistence layer.
//!
//! Tables mirror the hosted backend the trading UI was built against:
//! - `auth_users`: credentials for sign-in
//! - `users`: accounts with wallet balance and total portfolio value
//! - `portfolio`: one position row per user per symbol
//! - `trades`: executed trade log
//! - `leaderboard`: per-user ranking snapshot
//! - `wallet_transactions`: signed wallet movements
//! - `stocks`: cached quotes for the market list
//!
//! Row helpers take a `&Connection` so that settlement can run several of
//! them inside one transaction (see [`SqliteStore::with_transaction`]).

use crate::types::{
    AuthIdentity, LeaderboardEntry, Position, StockListing, TradeRecord, TradeSide, UserAccount,
    UserBalance, WalletTransaction, WalletTransactionType,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

/// SQLite store for accounts, positions, trades and market cache.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn();

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS auth_users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                auth_user_id TEXT UNIQUE NOT NULL REFERENCES auth_users(id),
                email TEXT NOT NULL,
                username TEXT NOT NULL,
                wallet_balance REAL NOT NULL,
                total_portfolio_value REAL NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS portfolio (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                stock_symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                average_buy_price REAL NOT NULL,
                total_invested REAL NOT NULL,
                current_value REAL NOT NULL,
                unrealized_pnl REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id, stock_symbol)
            );

            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                stock_symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price_per_share REAL NOT NULL,
                total_amount REAL NOT NULL,
                trade_type TEXT NOT NULL,
                order_type TEXT NOT NULL,
                status TEXT NOT NULL,
                idempotency_key TEXT,
                created_at INTEGER NOT NULL,
                executed_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trades_user_created
                ON trades(user_id, created_at DESC);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_trades_idempotency
                ON trades(user_id, idempotency_key) WHERE idempotency_key IS NOT NULL;

            CREATE TABLE IF NOT EXISTS leaderboard (
                user_id TEXT PRIMARY KEY REFERENCES users(id),
                username TEXT NOT NULL,
                portfolio_value REAL NOT NULL,
                daily_change REAL NOT NULL,
                daily_change_percent REAL NOT NULL,
                last_updated INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wallet_transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                amount REAL NOT NULL,
                transaction_type TEXT NOT NULL,
                description TEXT,
                reference_id TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_wallet_tx_user
                ON wallet_transactions(user_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS stocks (
                symbol TEXT PRIMARY KEY,
                company_name TEXT NOT NULL,
                current_price REAL NOT NULL,
                price_change REAL NOT NULL,
                price_change_percent REAL NOT NULL,
                market_cap REAL,
                volume REAL,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_updated INTEGER NOT NULL
            );",
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    /// Run `f` inside a transaction. Commits when `f` succeeds, rolls back
    /// when it returns an error.
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ========== Account Methods ==========

    /// Create an auth identity, its user row, the sign-up grant and the
    /// initial leaderboard row atomically.
    pub fn create_account(
        &self,
        identity: &AuthIdentity,
        user: &UserAccount,
        grant: &WalletTransaction,
        entry: &LeaderboardEntry,
    ) -> Result<(), rusqlite::Error> {
        self.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO auth_users (id, email, password_hash, salt, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    identity.id,
                    identity.email,
                    identity.password_hash,
                    identity.salt,
                    identity.created_at,
                ],
            )?;
            Self::insert_user(conn, user)?;
            Self::insert_wallet_transaction(conn, grant)?;
            Self::upsert_leaderboard(conn, entry)?;
            Ok(())
        })
    }

    /// Look up credentials by email.
    pub fn get_identity_by_email(&self, email: &str) -> Option<AuthIdentity> {
        let conn = self.conn();
        let result = conn
            .query_row(
                "SELECT id, email, password_hash, salt, created_at
                 FROM auth_users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(AuthIdentity {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        password_hash: row.get(2)?,
                        salt: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional();

        result.unwrap_or_else(|e| {
            error!("Error fetching auth identity: {}", e);
            None
        })
    }

    /// Resolve the account belonging to an auth identity.
    pub fn get_user_by_auth_id(&self, auth_user_id: &str) -> Option<UserAccount> {
        let conn = self.conn();
        Self::user_where(&conn, "auth_user_id", auth_user_id).unwrap_or_else(|e| {
            error!("Error fetching user by auth id: {}", e);
            None
        })
    }

    /// Get an account by internal ID.
    pub fn get_user(&self, user_id: &str) -> Option<UserAccount> {
        let conn = self.conn();
        Self::user_in(&conn, user_id).unwrap_or_else(|e| {
            error!("Error fetching user {}: {}", user_id, e);
            None
        })
    }

    /// Wallet balance and total value, `None` when the user has no row.
    pub fn get_balance(&self, user_id: &str) -> Result<Option<UserBalance>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            "SELECT wallet_balance, total_portfolio_value FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(UserBalance {
                    wallet_balance: row.get(0)?,
                    total_portfolio_value: row.get(1)?,
                })
            },
        )
        .optional()
    }

    /// Number of accounts.
    pub fn user_count(&self) -> usize {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .unwrap_or(0)
    }

    // ========== Read Methods ==========

    /// All positions for a user, including fully sold ones.
    pub fn get_positions(&self, user_id: &str) -> Vec<Position> {
        let conn = self.conn();
        Self::positions_in(&conn, user_id).unwrap_or_else(|e| {
            error!("Error fetching positions for {}: {}", user_id, e);
            Vec::new()
        })
    }

    /// Trade history for a user, newest first.
    pub fn get_trades(&self, user_id: &str, limit: usize) -> Vec<TradeRecord> {
        let conn = self.conn();
        let result = conn
            .prepare(
                "SELECT id, user_id, stock_symbol, quantity, price_per_share, total_amount,
                        trade_type, order_type, status, idempotency_key, created_at, executed_at
                 FROM trades WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )
            .and_then(|mut stmt| {
                stmt.query_map(params![user_id, limit as i64], Self::row_to_trade)?
                    .collect::<Result<Vec<_>, _>>()
            });

        result.unwrap_or_else(|e| {
            error!("Error fetching trades for {}: {}", user_id, e);
            Vec::new()
        })
    }

    /// Number of trades a user has executed.
    pub fn trade_count(&self, user_id: &str) -> u64 {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE user_id = ?1",
            params![user_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .unwrap_or(0)
    }

    /// Leaderboard ordered by portfolio value, with 1-based ranks.
    pub fn get_leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let conn = self.conn();
        let result = conn
            .prepare(
                "SELECT user_id, username, portfolio_value, daily_change, daily_change_percent,
                        last_updated
                 FROM leaderboard
                 ORDER BY portfolio_value DESC, last_updated ASC
                 LIMIT ?1",
            )
            .and_then(|mut stmt| {
                stmt.query_map(params![limit as i64], |row| {
                    Ok(LeaderboardEntry {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        portfolio_value: row.get(2)?,
                        daily_change: row.get(3)?,
                        daily_change_percent: row.get(4)?,
                        rank: 0,
                        last_updated: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()
            });

        let mut entries = result.unwrap_or_else(|e| {
            error!("Error fetching leaderboard: {}", e);
            Vec::new()
        });
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i as u32 + 1;
        }
        entries
    }

    /// Wallet movements for a user, newest first.
    pub fn get_wallet_transactions(&self, user_id: &str, limit: usize) -> Vec<WalletTransaction> {
        let conn = self.conn();
        let result = conn
            .prepare(
                "SELECT id, user_id, amount, transaction_type, description, reference_id, created_at
                 FROM wallet_transactions WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )
            .and_then(|mut stmt| {
                stmt.query_map(params![user_id, limit as i64], |row| {
                    let kind: String = row.get(3)?;
                    Ok(WalletTransaction {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        amount: row.get(2)?,
                        transaction_type: WalletTransactionType::parse(&kind)
                            .unwrap_or(WalletTransactionType::InitialGrant),
                        description: row.get(4)?,
                        reference_id: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()
            });

        result.unwrap_or_else(|e| {
            error!("Error fetching wallet transactions for {}: {}", user_id, e);
            Vec::new()
        })
    }

    // ========== Stock Cache Methods ==========

    /// Insert or refresh a cached stock row.
    pub fn upsert_stock(&self, stock: &StockListing) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO stocks (symbol, company_name, current_price, price_change,
                                 price_change_percent, market_cap, volume, is_active, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(symbol) DO UPDATE SET
                company_name = excluded.company_name,
                current_price = excluded.current_price,
                price_change = excluded.price_change,
                price_change_percent = excluded.price_change_percent,
                market_cap = COALESCE(excluded.market_cap, stocks.market_cap),
                volume = excluded.volume,
                is_active = excluded.is_active,
                last_updated = excluded.last_updated",
            params![
                stock.symbol,
                stock.company_name,
                stock.current_price,
                stock.price_change,
                stock.price_change_percent,
                stock.market_cap,
                stock.volume,
                stock.is_active,
                stock.last_updated,
            ],
        )?;
        Ok(())
    }

    /// Get a cached stock row.
    pub fn get_stock(&self, symbol: &str) -> Option<StockListing> {
        let conn = self.conn();
        let result = conn
            .query_row(
                "SELECT symbol, company_name, current_price, price_change, price_change_percent,
                        market_cap, volume, is_active, last_updated
                 FROM stocks WHERE symbol = ?1",
                params![symbol],
                Self::row_to_stock,
            )
            .optional();

        result.unwrap_or_else(|e| {
            error!("Error fetching stock {}: {}", symbol, e);
            None
        })
    }

    /// All active cached stocks, alphabetically.
    pub fn get_stocks(&self) -> Vec<StockListing> {
        let conn = self.conn();
        let result = conn
            .prepare(
                "SELECT symbol, company_name, current_price, price_change, price_change_percent,
                        market_cap, volume, is_active, last_updated
                 FROM stocks WHERE is_active = 1 ORDER BY symbol",
            )
            .and_then(|mut stmt| {
                stmt.query_map([], Self::row_to_stock)?
                    .collect::<Result<Vec<_>, _>>()
            });

        result.unwrap_or_else(|e| {
            error!("Error fetching stocks: {}", e);
            Vec::new()
        })
    }

    // ========== Row Helpers (usable inside a transaction) ==========

    pub fn user_in(conn: &Connection, user_id: &str) -> Result<Option<UserAccount>, rusqlite::Error> {
        Self::user_where(conn, "id", user_id)
    }

    fn user_where(conn: &Connection, column: &str, value: &str) -> Result<Option<UserAccount>, rusqlite::Error> {
        let sql = format!(
            "SELECT id, auth_user_id, email, username, wallet_balance, total_portfolio_value,
                    created_at, updated_at
             FROM users WHERE {} = ?1",
            column
        );
        conn.query_row(&sql, params![value], |row| {
            Ok(UserAccount {
                id: row.get(0)?,
                auth_user_id: row.get(1)?,
                email: row.get(2)?,
                username: row.get(3)?,
                wallet_balance: row.get(4)?,
                total_portfolio_value: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })
        .optional()
    }

    pub fn insert_user(conn: &Connection, user: &UserAccount) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO users (id, auth_user_id, email, username, wallet_balance,
                                total_portfolio_value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.auth_user_id,
                user.email,
                user.username,
                user.wallet_balance,
                user.total_portfolio_value,
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_wallet_balance(conn: &Connection, user_id: &str, wallet_balance: f64) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE users SET wallet_balance = ?1, updated_at = ?2 WHERE id = ?3",
            params![wallet_balance, chrono::Utc::now().timestamp_millis(), user_id],
        )?;
        Ok(())
    }

    pub fn update_portfolio_value(conn: &Connection, user_id: &str, total_value: f64) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE users SET total_portfolio_value = ?1, updated_at = ?2 WHERE id = ?3",
            params![total_value, chrono::Utc::now().timestamp_millis(), user_id],
        )?;
        Ok(())
    }

    pub fn position_in(conn: &Connection, user_id: &str, symbol: &str) -> Result<Option<Position>, rusqlite::Error> {
        conn.query_row(
            "SELECT id, user_id, stock_symbol, quantity, average_buy_price, total_invested,
                    current_value, unrealized_pnl, realized_pnl, created_at, updated_at
             FROM portfolio WHERE user_id = ?1 AND stock_symbol = ?2",
            params![user_id, symbol],
            Self::row_to_position,
        )
        .optional()
    }

    pub fn positions_in(conn: &Connection, user_id: &str) -> Result<Vec<Position>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, stock_symbol, quantity, average_buy_price, total_invested,
                    current_value, unrealized_pnl, realized_pnl, created_at, updated_at
             FROM portfolio WHERE user_id = ?1
             ORDER BY stock_symbol",
        )?;
        let positions = stmt
            .query_map(params![user_id], Self::row_to_position)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(positions)
    }

    pub fn insert_position(conn: &Connection, position: &Position) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO portfolio (id, user_id, stock_symbol, quantity, average_buy_price,
                                    total_invested, current_value, unrealized_pnl, realized_pnl,
                                    created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                position.id,
                position.user_id,
                position.symbol,
                position.quantity,
                position.average_buy_price,
                position.total_invested,
                position.current_value,
                position.unrealized_pnl,
                position.realized_pnl,
                position.created_at,
                position.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_position(conn: &Connection, position: &Position) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE portfolio SET
                quantity = ?1,
                average_buy_price = ?2,
                total_invested = ?3,
                current_value = ?4,
                unrealized_pnl = ?5,
                realized_pnl = ?6,
                updated_at = ?7
             WHERE id = ?8",
            params![
                position.quantity,
                position.average_buy_price,
                position.total_invested,
                position.current_value,
                position.unrealized_pnl,
                position.realized_pnl,
                position.updated_at,
                position.id,
            ],
        )?;
        Ok(())
    }

    pub fn insert_trade(conn: &Connection, trade: &TradeRecord) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO trades (id, user_id, stock_symbol, quantity, price_per_share, total_amount,
                                 trade_type, order_type, status, idempotency_key, created_at,
                                 executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                trade.id,
                trade.user_id,
                trade.symbol,
                trade.quantity,
                trade.price_per_share,
                trade.total_amount,
                trade.trade_type.as_str(),
                trade.order_type,
                trade.status,
                trade.idempotency_key,
                trade.created_at,
                trade.executed_at,
            ],
        )?;
        Ok(())
    }

    pub fn trade_by_key(conn: &Connection, user_id: &str, key: &str) -> Result<Option<TradeRecord>, rusqlite::Error> {
        conn.query_row(
            "SELECT id, user_id, stock_symbol, quantity, price_per_share, total_amount,
                    trade_type, order_type, status, idempotency_key, created_at, executed_at
             FROM trades WHERE user_id = ?1 AND idempotency_key = ?2",
            params![user_id, key],
            Self::row_to_trade,
        )
        .optional()
    }

    pub fn insert_wallet_transaction(conn: &Connection, tx: &WalletTransaction) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO wallet_transactions (id, user_id, amount, transaction_type, description,
                                              reference_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tx.id,
                tx.user_id,
                tx.amount,
                tx.transaction_type.as_str(),
                tx.description,
                tx.reference_id,
                tx.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_leaderboard(conn: &Connection, entry: &LeaderboardEntry) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO leaderboard (user_id, username, portfolio_value, daily_change,
                                      daily_change_percent, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                portfolio_value = excluded.portfolio_value,
                daily_change = excluded.daily_change,
                daily_change_percent = excluded.daily_change_percent,
                last_updated = excluded.last_updated",
            params![
                entry.user_id,
                entry.username,
                entry.portfolio_value,
                entry.daily_change,
                entry.daily_change_percent,
                entry.last_updated,
            ],
        )?;
        Ok(())
    }

    fn row_to_position(row: &Row<'_>) -> Result<Position, rusqlite::Error> {
        Ok(Position {
            id: row.get(0)?,
            user_id: row.get(1)?,
            symbol: row.get(2)?,
            quantity: row.get(3)?,
            average_buy_price: row.get(4)?,
            total_invested: row.get(5)?,
            current_value: row.get(6)?,
            unrealized_pnl: row.get(7)?,
            realized_pnl: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn row_to_trade(row: &Row<'_>) -> Result<TradeRecord, rusqlite::Error> {
        let side: String = row.get(6)?;
        let trade_type = TradeSide::parse(&side).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("unknown trade type: {}", side).into(),
            )
        })?;

        Ok(TradeRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            symbol: row.get(2)?,
            quantity: row.get(3)?,
            price_per_share: row.get(4)?,
            total_amount: row.get(5)?,
            trade_type,
            order_type: row.get(7)?,
            status: row.get(8)?,
            idempotency_key: row.get(9)?,
            created_at: row.get(10)?,
            executed_at: row.get(11)?,
        })
    }

    fn row_to_stock(row: &Row<'_>) -> Result<StockListing, rusqlite::Error> {
        Ok(StockListing {
            symbol: row.get(0)?,
            company_name: row.get(1)?,
            current_price: row.get(2)?,
            price_change: row.get(3)?,
            price_change_percent: row.get(4)?,
            market_cap: row.get(5)?,
            volume: row.get(6)?,
            is_active: row.get(7)?,
            last_updated: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StockQuote;

    fn seed_user(store: &SqliteStore) -> UserAccount {
        let identity = AuthIdentity {
            id: "auth-1".to_string(),
            email: "trader@example.com".to_string(),
            password_hash: "00".to_string(),
            salt: "11".to_string(),
            created_at: 0,
        };
        let user = UserAccount::new(identity.id.clone(), identity.email.clone(), "trader".to_string(), 10_000.0);
        let grant = WalletTransaction::new(
            user.id.clone(),
            10_000.0,
            WalletTransactionType::InitialGrant,
            None,
            None,
        );
        let entry = LeaderboardEntry::compute(user.id.clone(), user.username.clone(), 10_000.0, &[]);
        store.create_account(&identity, &user, &grant, &entry).unwrap();
        user
    }

    #[test]
    fn test_create_account() {
        let store = SqliteStore::new_in_memory().unwrap();
        let user = seed_user(&store);

        assert_eq!(store.user_count(), 1);
        assert!(store.get_identity_by_email("trader@example.com").is_some());
        let loaded = store.get_user_by_auth_id("auth-1").unwrap();
        assert_eq!(loaded.id, user.id);
        assert_eq!(store.get_wallet_transactions(&user.id, 10).len(), 1);
        assert_eq!(store.get_leaderboard(10).len(), 1);
    }

    #[test]
    fn test_duplicate_email_rolls_back() {
        let store = SqliteStore::new_in_memory().unwrap();
        seed_user(&store);

        let identity = AuthIdentity {
            id: "auth-2".to_string(),
            email: "trader@example.com".to_string(),
            password_hash: "00".to_string(),
            salt: "11".to_string(),
            created_at: 0,
        };
        let user = UserAccount::new(identity.id.clone(), identity.email.clone(), "other".to_string(), 10_000.0);
        let grant = WalletTransaction::new(user.id.clone(), 10_000.0, WalletTransactionType::InitialGrant, None, None);
        let entry = LeaderboardEntry::compute(user.id.clone(), user.username.clone(), 10_000.0, &[]);

        assert!(store.create_account(&identity, &user, &grant, &entry).is_err());
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_missing_balance_is_none() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.get_balance("nobody").unwrap().is_none());
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = SqliteStore::new_in_memory().unwrap();
        let user = seed_user(&store);

        let result: Result<(), rusqlite::Error> = store.with_transaction(|conn| {
            SqliteStore::update_wallet_balance(conn, &user.id, 1.0)?;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });

        assert!(result.is_err());
        let balance = store.get_balance(&user.id).unwrap().unwrap();
        assert_eq!(balance.wallet_balance, 10_000.0);
    }

    #[test]
    fn test_stock_cache_upsert() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut quote = StockQuote {
            symbol: "AAPL".to_string(),
            company: "Apple Inc".to_string(),
            price: 190.0,
            change: 1.0,
            change_percent: 0.5,
            previous_close: Some(189.0),
            volume: None,
        };
        store.upsert_stock(&StockListing::from_quote(&quote)).unwrap();
        quote.price = 191.0;
        store.upsert_stock(&StockListing::from_quote(&quote)).unwrap();

        let stocks = store.get_stocks();
        assert_eq!(stocks.len(), 1);
        assert_eq!(store.get_stock("AAPL").unwrap().current_price, 191.0);
    }
}
