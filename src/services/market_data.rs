//! Market data lookups backed by Finnhub, with the `stocks` table as a
//! last-known-quote cache.

use crate::services::SqliteStore;
use crate::sources::finnhub::{FinnhubClient, QuoteError, POPULAR_STOCKS};
use crate::types::{CompanyProfile, MarketStatus, MarketSymbol, StockListing, StockQuote, SymbolMatch};
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest popular-stock request honoured.
const MAX_POPULAR: usize = 100;

fn quote_from_listing(listing: StockListing) -> StockQuote {
    StockQuote {
        symbol: listing.symbol,
        company: listing.company_name,
        price: listing.current_price,
        change: listing.price_change,
        change_percent: listing.price_change_percent,
        previous_close: None,
        volume: listing.volume,
    }
}

/// Normalize a user-supplied ticker.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Quote, profile, search and symbol-list service.
pub struct MarketDataService {
    finnhub: Option<Arc<FinnhubClient>>,
    sqlite: Arc<SqliteStore>,
}

impl MarketDataService {
    pub fn new(finnhub: Option<Arc<FinnhubClient>>, sqlite: Arc<SqliteStore>) -> Self {
        Self { finnhub, sqlite }
    }

    pub fn is_configured(&self) -> bool {
        self.finnhub.is_some()
    }

    fn client(&self) -> Result<&FinnhubClient, QuoteError> {
        self.finnhub.as_deref().ok_or(QuoteError::NotConfigured)
    }

    /// Latest quote. Successful quotes refresh the cache. When Finnhub fails
    /// the cached quote is served instead, if there is one.
    pub async fn quote(&self, symbol: &str) -> Result<Option<StockQuote>, QuoteError> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Ok(None);
        }

        let fetched = match self.client() {
            Ok(client) => client.get_quote(&symbol).await,
            Err(e) => Err(e),
        };

        match fetched {
            Ok(Some(mut quote)) => {
                if let Some(cached) = self.sqlite.get_stock(&symbol) {
                    if cached.company_name != symbol {
                        quote.company = cached.company_name;
                    }
                }
                self.cache_quote(&quote);
                Ok(Some(quote))
            }
            Ok(None) => Ok(None),
            Err(e) => match self.sqlite.get_stock(&symbol) {
                Some(cached) => {
                    debug!("Serving cached quote for {}: {}", symbol, e);
                    Ok(Some(quote_from_listing(cached)))
                }
                None => Err(e),
            },
        }
    }

    /// Company profile, `None` when Finnhub has none.
    pub async fn profile(&self, symbol: &str) -> Result<Option<CompanyProfile>, QuoteError> {
        let symbol = normalize_symbol(symbol);
        self.client()?.get_profile(&symbol).await
    }

    /// Quotes for the first `limit` popular stocks. Falls back to cached
    /// rows when no provider is configured.
    pub async fn popular(&self, limit: usize) -> Vec<StockQuote> {
        let limit = limit.min(MAX_POPULAR);
        let client = match self.client() {
            Ok(client) => client,
            Err(_) => {
                return POPULAR_STOCKS
                    .iter()
                    .take(limit)
                    .filter_map(|s| self.sqlite.get_stock(s))
                    .map(quote_from_listing)
                    .collect();
            }
        };

        let quotes = client.popular_stocks(limit).await;
        for quote in &quotes {
            self.cache_quote(quote);
        }
        quotes
    }

    /// Symbol search. Failures yield an empty list.
    pub async fn search(&self, query: &str) -> Vec<SymbolMatch> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let result = match self.client() {
            Ok(client) => client.search(query).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!("Symbol search for {:?} failed: {}", query, e);
            Vec::new()
        })
    }

    /// US market status.
    pub async fn market_status(&self) -> Result<MarketStatus, QuoteError> {
        self.client()?.market_status().await
    }

    /// US symbol list. Falls back to the popular stocks when the list
    /// cannot be fetched.
    pub async fn symbols(&self, limit: Option<usize>) -> Vec<MarketSymbol> {
        let result = match self.client() {
            Ok(client) => client.us_symbols(limit).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("Symbol list unavailable, using popular stocks: {}", e);
                self.popular(MAX_POPULAR)
                    .await
                    .into_iter()
                    .map(|q| MarketSymbol {
                        description: Some(q.company),
                        symbol: q.symbol,
                    })
                    .collect()
            }
        }
    }

    /// Cached stock rows.
    pub fn cached_stocks(&self) -> Vec<StockListing> {
        self.sqlite.get_stocks()
    }

    fn cache_quote(&self, quote: &StockQuote) {
        if let Err(e) = self.sqlite.upsert_stock(&StockListing::from_quote(quote)) {
            warn!("Failed to cache quote for {}: {}", quote.symbol, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (MarketDataService, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        (MarketDataService::new(None, store.clone()), store)
    }

    fn quote(symbol: &str, price: f64) -> StockQuote {
        StockQuote {
            symbol: symbol.to_string(),
            company: format!("{} Corp", symbol),
            price,
            change: 0.0,
            change_percent: 0.0,
            previous_close: None,
            volume: None,
        }
    }

    #[tokio::test]
    async fn test_unconfigured_quote_uses_cache() {
        let (service, store) = service();
        assert!(matches!(service.quote("AAPL").await, Err(QuoteError::NotConfigured)));

        store.upsert_stock(&StockListing::from_quote(&quote("AAPL", 190.0))).unwrap();
        let cached = service.quote("aapl").await.unwrap().unwrap();
        assert_eq!(cached.price, 190.0);
        assert_eq!(cached.company, "AAPL Corp");
    }

    #[tokio::test]
    async fn test_unconfigured_search_is_empty() {
        let (service, _) = service();
        assert!(service.search("apple").await.is_empty());
        assert!(service.search("   ").await.is_empty());
    }

    #[tokio::test]
    async fn test_symbols_fall_back_to_popular() {
        let (service, store) = service();
        store.upsert_stock(&StockListing::from_quote(&quote("MSFT", 400.0))).unwrap();
        store.upsert_stock(&StockListing::from_quote(&quote("ZZZZ", 1.0))).unwrap();

        let symbols = service.symbols(None).await;
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].symbol, "MSFT");
        assert_eq!(symbols[0].description.as_deref(), Some("MSFT Corp"));
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" nvda "), "NVDA");
    }
}
