//! Price feed
//!
//! Sits between the quote stream and browser clients:
//! - tracks which symbols are watched (reference counted) and drives the
//!   stream's subscriptions from that
//! - stores the latest price per symbol
//! - polls REST quotes for watched symbols that have gone quiet

use crate::services::MarketDataService;
use crate::sources::FinnhubWs;
use crate::types::{PriceSnapshot, PriceSource, PriceUpdateData, StreamEvent, StreamStatus, Tick};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Polling configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// How often stale symbols are polled
    pub poll_interval: Duration,
    /// A symbol without a tick for this long is stale
    pub stale_threshold: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stale_threshold: Duration::from_secs(10),
        }
    }
}

/// Update fanned out to WebSocket clients.
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    Price(PriceUpdateData),
    Status(StreamStatus),
}

/// Latest prices and watch list.
#[derive(Clone)]
pub struct PriceFeed {
    stream: FinnhubWs,
    market: Arc<MarketDataService>,
    config: FeedConfig,
    /// Latest price per symbol
    prices: Arc<DashMap<String, PriceSnapshot>>,
    /// When each symbol last ticked on the stream (ms)
    last_tick: Arc<DashMap<String, i64>>,
    /// Watcher count per symbol
    watchers: Arc<DashMap<String, usize>>,
    updates: broadcast::Sender<FeedUpdate>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl PriceFeed {
    pub fn new(stream: FinnhubWs, market: Arc<MarketDataService>, config: FeedConfig) -> Self {
        let (updates, _) = broadcast::channel(4096);
        let (shutdown, _) = watch::channel(false);
        Self {
            stream,
            market,
            config,
            prices: Arc::new(DashMap::new()),
            last_tick: Arc::new(DashMap::new()),
            watchers: Arc::new(DashMap::new()),
            updates,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Listen for price and status updates.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.updates.subscribe()
    }

    /// Add a watcher to each symbol. Symbols gaining their first watcher are
    /// subscribed on the stream and returned.
    ///
    /// Stream calls are made while the symbol's entry is locked.
    pub fn watch(&self, symbols: &[String]) -> Vec<String> {
        let mut added = Vec::new();
        for symbol in normalize(symbols) {
            match self.watchers.entry(symbol.clone()) {
                Entry::Occupied(mut entry) => *entry.get_mut() += 1,
                Entry::Vacant(entry) => {
                    let _guard = entry.insert(1);
                    self.stream.subscribe(std::slice::from_ref(&symbol));
                    added.push(symbol);
                }
            }
        }

        if !added.is_empty() {
            debug!("Watching {:?}", added);
        }
        added
    }

    /// Remove a watcher from each symbol. Symbols losing their last watcher
    /// are unsubscribed on the stream and returned.
    pub fn unwatch(&self, symbols: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        for symbol in normalize(symbols) {
            // Counts are never zero while the entry exists.
            if let Entry::Occupied(mut entry) = self.watchers.entry(symbol.clone()) {
                *entry.get_mut() -= 1;
                if *entry.get() == 0 {
                    self.stream.unsubscribe(std::slice::from_ref(&symbol));
                    self.last_tick.remove(&symbol);
                    entry.remove();
                    removed.push(symbol);
                }
            }
        }

        if !removed.is_empty() {
            debug!("No longer watching {:?}", removed);
        }
        removed
    }

    /// Watched symbols, sorted.
    pub fn watched(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.watchers.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn latest(&self, symbol: &str) -> Option<PriceSnapshot> {
        self.prices.get(symbol).map(|p| p.clone())
    }

    /// Latest prices for the given symbols, skipping unknown ones.
    pub fn snapshot(&self, symbols: &[String]) -> Vec<PriceSnapshot> {
        normalize(symbols)
            .iter()
            .filter_map(|s| self.latest(s))
            .collect()
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.stream.status()
    }

    /// Watched symbols with no stream tick within the stale threshold.
    pub fn stale_symbols(&self, now: i64) -> Vec<String> {
        let threshold = self.config.stale_threshold.as_millis() as i64;
        let mut stale: Vec<String> = self
            .watchers
            .iter()
            .map(|e| e.key().clone())
            .filter(|s| match self.last_tick.get(s) {
                Some(at) => now - *at > threshold,
                None => true,
            })
            .collect();
        stale.sort();
        stale
    }

    /// Store a stream or simulated tick and broadcast it.
    pub fn record(&self, tick: Tick) {
        self.last_tick
            .insert(tick.symbol.clone(), chrono::Utc::now().timestamp_millis());
        self.store(tick.symbol, tick.price, tick.timestamp, tick.source);
    }

    fn store(&self, symbol: String, price: f64, timestamp: i64, source: PriceSource) {
        let previous = self
            .prices
            .insert(
                symbol.clone(),
                PriceSnapshot {
                    symbol: symbol.clone(),
                    price,
                    timestamp,
                    source,
                },
            )
            .map(|p| p.price);

        let _ = self.updates.send(FeedUpdate::Price(PriceUpdateData {
            symbol,
            price,
            previous_price: previous,
            timestamp,
            source,
        }));
    }

    /// Fetch REST quotes for stale symbols. Errors are logged, never raised.
    pub async fn poll_stale(&self) -> usize {
        let stale = self.stale_symbols(chrono::Utc::now().timestamp_millis());
        if stale.is_empty() {
            return 0;
        }

        let quotes = join_all(stale.iter().map(|s| self.market.quote(s))).await;
        let now = chrono::Utc::now().timestamp_millis();
        let mut updated = 0;
        for (symbol, result) in stale.into_iter().zip(quotes) {
            match result {
                Ok(Some(quote)) if quote.price > 0.0 => {
                    self.store(symbol, quote.price, now, PriceSource::Rest);
                    updated += 1;
                }
                Ok(_) => {}
                Err(e) => debug!("REST fallback polling error for {}: {}", symbol, e),
            }
        }
        updated
    }

    /// Spawn the stream consumer and the stale-symbol poller.
    pub fn start(&self) {
        let feed = self.clone();
        let mut events = self.stream.subscribe_events();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(StreamEvent::Tick(tick)) => feed.record(tick),
                        Ok(StreamEvent::StatusChanged(status)) => {
                            info!("Quote stream {:?}", status);
                            let _ = feed.updates.send(FeedUpdate::Status(status));
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Price feed lagged, skipped {} stream events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Price feed consumer stopped");
        });

        let feed = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let period = feed.config.poll_interval;
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let updated = feed.poll_stale().await;
                        if updated > 0 {
                            debug!("REST fallback refreshed {} symbols", updated);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Price poller stopped");
        });
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

fn normalize(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}
