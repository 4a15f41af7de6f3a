pub mod auth;
pub mod market_data;
pub mod price_feed;
pub mod sqlite_store;
pub mod trading;

pub use auth::{AuthError, AuthService};
pub use market_data::MarketDataService;
pub use price_feed::{FeedConfig, FeedUpdate, PriceFeed};
pub use sqlite_store::SqliteStore;
pub use trading::{TradingError, TradingService};
