//! Market data types served to clients.

use serde::{Deserialize, Serialize};

/// Latest quote for a stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuote {
    pub symbol: String,
    /// Company name (falls back to the symbol when no profile is known)
    pub company: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Company profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub ticker: Option<String>,
    pub name: String,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    pub ipo: Option<String>,
    /// Market capitalization in millions
    pub market_capitalization: Option<f64>,
    pub share_outstanding: Option<f64>,
    pub phone: Option<String>,
    pub weburl: Option<String>,
    pub logo: Option<String>,
    pub industry: Option<String>,
}

/// A symbol search match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMatch {
    pub description: String,
    pub display_symbol: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub symbol_type: String,
}

/// A listed symbol for browsing the market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSymbol {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Exchange open/closed status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatus {
    pub exchange: String,
    pub holiday: Option<String>,
    pub is_open: bool,
    pub session: Option<String>,
    pub timezone: Option<String>,
    #[serde(rename = "t")]
    pub timestamp: i64,
}

/// Cached row of the `stocks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockListing {
    pub symbol: String,
    pub company_name: String,
    pub current_price: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    pub is_active: bool,
    pub last_updated: i64,
}

impl StockListing {
    pub fn from_quote(quote: &StockQuote) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            company_name: quote.company.clone(),
            current_price: quote.price,
            price_change: quote.change,
            price_change_percent: quote.change_percent,
            market_cap: None,
            volume: quote.volume,
            is_active: true,
            last_updated: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Where a price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Live trade from the streaming feed
    Stream,
    /// Random-walk tick generated while the feed is down
    Simulated,
    /// REST quote fetched by the stale-symbol poller
    Rest,
}

/// Latest known price for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub symbol: String,
    pub price: f64,
    /// Time of the price (ms)
    pub timestamp: i64,
    pub source: PriceSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_quote_serialization_skips_missing() {
        let quote = StockQuote {
            symbol: "AAPL".to_string(),
            company: "Apple Inc".to_string(),
            price: 190.5,
            change: 1.5,
            change_percent: 0.79,
            previous_close: None,
            volume: None,
        };
        let json = serde_json::to_string(&quote).unwrap();
        assert!(json.contains("\"changePercent\":0.79"));
        assert!(!json.contains("previousClose"));
    }

    #[test]
    fn test_listing_from_quote() {
        let quote = StockQuote {
            symbol: "MSFT".to_string(),
            company: "Microsoft".to_string(),
            price: 400.0,
            change: -2.0,
            change_percent: -0.5,
            previous_close: Some(402.0),
            volume: Some(1000.0),
        };
        let listing = StockListing::from_quote(&quote);
        assert_eq!(listing.symbol, "MSFT");
        assert_eq!(listing.current_price, 400.0);
        assert!(listing.is_active);
    }

    #[test]
    fn test_price_source_serialization() {
        assert_eq!(serde_json::to_string(&PriceSource::Simulated).unwrap(), "\"simulated\"");
    }
}
