//! Finnhub REST client for US stock data.
//!
//! Provides quotes, company profiles, symbol search, market status and the
//! US symbol list.

use crate::types::{CompanyProfile, MarketStatus, MarketSymbol, StockQuote, SymbolMatch};
use futures_util::future::join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const FINNHUB_URL: &str = "https://finnhub.io/api/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stocks shown on the landing page, in display order.
pub const POPULAR_STOCKS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "META", "NVDA", "NFLX"];

/// Default number of popular stocks returned.
pub const DEFAULT_POPULAR_LIMIT: usize = 6;

/// Quote client errors.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Status(reqwest::StatusCode),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Quote provider is not configured")]
    NotConfigured,
}

/// Finnhub quote response.
#[derive(Debug, Clone, Deserialize)]
pub struct FinnhubQuote {
    /// Current price (0 for unknown symbols)
    #[serde(rename = "c", default)]
    pub current: f64,
    /// Change
    #[serde(rename = "d")]
    pub change: Option<f64>,
    /// Percent change
    #[serde(rename = "dp")]
    pub change_percent: Option<f64>,
    /// Previous close price
    #[serde(rename = "pc")]
    pub previous_close: Option<f64>,
    /// Volume (not always present)
    #[serde(rename = "v")]
    pub volume: Option<f64>,
}

/// Finnhub company profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinnhubProfile {
    pub country: Option<String>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    #[serde(rename = "finnhubIndustry")]
    pub industry: Option<String>,
    pub ipo: Option<String>,
    pub logo: Option<String>,
    pub market_capitalization: Option<f64>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub share_outstanding: Option<f64>,
    pub ticker: Option<String>,
    pub weburl: Option<String>,
}

/// Finnhub search result.
#[derive(Debug, Clone, Deserialize)]
pub struct FinnhubSearchResult {
    #[serde(default)]
    pub result: Vec<SymbolMatch>,
}

/// Entry of the exchange symbol list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinnhubSymbol {
    pub symbol: String,
    pub display_symbol: Option<String>,
    pub description: Option<String>,
}

/// Convert a raw quote. A current price of 0 means the symbol is unknown.
pub fn quote_from_response(symbol: &str, raw: FinnhubQuote) -> Option<StockQuote> {
    if raw.current == 0.0 || !raw.current.is_finite() {
        return None;
    }
    Some(StockQuote {
        symbol: symbol.to_string(),
        company: symbol.to_string(),
        price: raw.current,
        change: raw.change.unwrap_or(0.0),
        change_percent: raw.change_percent.unwrap_or(0.0),
        previous_close: raw.previous_close,
        volume: raw.volume,
    })
}

/// Convert a raw profile. Profiles without a name are treated as missing.
pub fn profile_from_response(raw: FinnhubProfile) -> Option<CompanyProfile> {
    let name = raw.name.filter(|n| !n.is_empty())?;
    Some(CompanyProfile {
        ticker: raw.ticker,
        name,
        country: raw.country,
        currency: raw.currency,
        exchange: raw.exchange,
        ipo: raw.ipo,
        market_capitalization: raw.market_capitalization,
        share_outstanding: raw.share_outstanding,
        phone: raw.phone,
        weburl: raw.weburl,
        logo: raw.logo,
        industry: raw.industry,
    })
}

/// Map the exchange symbol list, describing each entry by its description,
/// then display symbol, then symbol.
pub fn symbols_from_response(raw: Vec<FinnhubSymbol>, limit: Option<usize>) -> Vec<MarketSymbol> {
    let mapped = raw.into_iter().map(|s| {
        let description = s
            .description
            .filter(|d| !d.is_empty())
            .or(s.display_symbol.filter(|d| !d.is_empty()))
            .unwrap_or_else(|| s.symbol.clone());
        MarketSymbol {
            symbol: s.symbol,
            description: Some(description),
        }
    });

    match limit {
        Some(n) => mapped.take(n).collect(),
        None => mapped.collect(),
    }
}

/// Finnhub API client.
pub struct FinnhubClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FinnhubClient {
    /// Create a new Finnhub client.
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, FINNHUB_URL.to_string())
    }

    /// Create a client against a different REST root.
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, QuoteError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| QuoteError::Parse(e.to_string()))
    }

    /// Get a quote for a symbol. `None` when the symbol is unknown.
    pub async fn get_quote(&self, symbol: &str) -> Result<Option<StockQuote>, QuoteError> {
        let raw: FinnhubQuote = self.get_json("/quote", &[("symbol", symbol)]).await?;
        Ok(quote_from_response(symbol, raw))
    }

    /// Get company profile. `None` when Finnhub has no profile.
    pub async fn get_profile(&self, symbol: &str) -> Result<Option<CompanyProfile>, QuoteError> {
        let raw: FinnhubProfile = self.get_json("/stock/profile2", &[("symbol", symbol)]).await?;
        Ok(profile_from_response(raw))
    }

    /// Search for symbols.
    pub async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, QuoteError> {
        let result: FinnhubSearchResult = self.get_json("/search", &[("q", query)]).await?;
        Ok(result.result)
    }

    /// US market open/closed status.
    pub async fn market_status(&self) -> Result<MarketStatus, QuoteError> {
        self.get_json("/market/status", &[("exchange", "US")]).await
    }

    /// US-listed symbols.
    pub async fn us_symbols(&self, limit: Option<usize>) -> Result<Vec<MarketSymbol>, QuoteError> {
        let raw: Vec<FinnhubSymbol> = self.get_json("/stock/symbol", &[("exchange", "US")]).await?;
        debug!("Fetched {} US symbols", raw.len());
        Ok(symbols_from_response(raw, limit))
    }

    /// Quote plus company name for the first `limit` popular stocks.
    ///
    /// Symbols whose quote fails are dropped. The company name comes from the
    /// profile when one is available.
    pub async fn popular_stocks(&self, limit: usize) -> Vec<StockQuote> {
        let lookups = POPULAR_STOCKS.iter().take(limit).map(|symbol| async move {
            let (quote, profile) = tokio::join!(self.get_quote(symbol), self.get_profile(symbol));

            let mut quote = match quote {
                Ok(Some(quote)) => quote,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Failed to fetch quote for {}: {}", symbol, e);
                    return None;
                }
            };
            if let Ok(Some(profile)) = profile {
                quote.company = profile.name;
            }
            Some(quote)
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_price_quote_is_unknown() {
        let raw: FinnhubQuote =
            serde_json::from_str(r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#).unwrap();
        assert!(quote_from_response("NOPE", raw).is_none());
    }

    #[test]
    fn test_quote_conversion() {
        let raw: FinnhubQuote = serde_json::from_str(
            r#"{"c":190.5,"d":1.5,"dp":0.79,"h":191,"l":188,"o":189,"pc":189,"t":1700000000}"#,
        )
        .unwrap();
        let quote = quote_from_response("AAPL", raw).unwrap();
        assert_eq!(quote.company, "AAPL");
        assert_eq!(quote.price, 190.5);
        assert_eq!(quote.change_percent, 0.79);
        assert_eq!(quote.previous_close, Some(189.0));
        assert_eq!(quote.volume, None);
    }

    #[test]
    fn test_profile_without_name_is_missing() {
        let raw: FinnhubProfile = serde_json::from_str("{}").unwrap();
        assert!(profile_from_response(raw).is_none());

        let raw: FinnhubProfile =
            serde_json::from_str(r#"{"name":"Apple Inc","finnhubIndustry":"Technology"}"#).unwrap();
        let profile = profile_from_response(raw).unwrap();
        assert_eq!(profile.name, "Apple Inc");
        assert_eq!(profile.industry.as_deref(), Some("Technology"));
    }

    #[test]
    fn test_symbol_description_fallback() {
        let raw: Vec<FinnhubSymbol> = serde_json::from_str(
            r#"[
                {"symbol":"AAPL","displaySymbol":"AAPL","description":"APPLE INC"},
                {"symbol":"BRK.B","displaySymbol":"BRK/B","description":""},
                {"symbol":"XYZ"}
            ]"#,
        )
        .unwrap();

        let symbols = symbols_from_response(raw.clone(), None);
        assert_eq!(symbols[0].description.as_deref(), Some("APPLE INC"));
        assert_eq!(symbols[1].description.as_deref(), Some("BRK/B"));
        assert_eq!(symbols[2].description.as_deref(), Some("XYZ"));

        assert_eq!(symbols_from_response(raw, Some(2)).len(), 2);
    }

    #[test]
    fn test_popular_order() {
        assert_eq!(&POPULAR_STOCKS[..DEFAULT_POPULAR_LIMIT], &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "META"]);
    }
}
