//! Finnhub WebSocket client for real-time US stock trades.
//!
//! Keeps a best-effort connection to the trade feed and publishes typed
//! [`StreamEvent`]s. While the feed is down (or no API key is configured)
//! requested symbols get random-walk ticks from the simulator instead.

use crate::sources::simulator;
use crate::types::{PriceSource, StreamEvent, StreamStatus, Tick};
use dashmap::{DashMap, DashSet};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub const FINNHUB_WS_URL: &str = "wss://ws.finnhub.io";

/// Stream client timing.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    /// Upper bound of the reconnect backoff
    pub reconnect_max: Duration,
    /// Simulated tick period while disconnected
    pub simulation_interval: Duration,
    /// Keepalive ping period
    pub ping_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: FINNHUB_WS_URL.to_string(),
            reconnect_max: Duration::from_secs(10),
            simulation_interval: Duration::from_millis(1500),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Delay before reconnect attempt `attempt` (0-based): 1s doubling up to `max`.
pub fn reconnect_delay(attempt: u32, max: Duration) -> Duration {
    let millis = 1000u64.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(millis).min(max)
}

/// Handshake URL for the feed. The request target always starts with `/`.
pub fn stream_url(base: &str, api_key: &str) -> String {
    format!("{}/?token={}", base.trim_end_matches('/'), api_key)
}

/// Finnhub WebSocket subscribe/unsubscribe message.
#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'a str,
    symbol: &'a str,
}

/// Finnhub trade data.
#[derive(Debug, Deserialize)]
struct TradeData {
    /// Symbol
    s: String,
    /// Price
    p: f64,
    /// Timestamp (milliseconds)
    t: i64,
}

/// Finnhub WebSocket message.
#[derive(Debug, Deserialize)]
struct FinnhubMessage {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    data: Vec<TradeData>,
}

/// Extract trade ticks from a feed frame. Non-trade frames yield nothing.
pub fn parse_trade_frame(text: &str) -> Vec<Tick> {
    let msg: FinnhubMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!("Unparseable Finnhub frame: {}", e);
            return Vec::new();
        }
    };

    if msg.msg_type != "trade" {
        return Vec::new();
    }

    msg.data
        .into_iter()
        .filter(|d| d.p.is_finite() && d.p > 0.0)
        .map(|d| Tick {
            symbol: d.s,
            price: d.p,
            timestamp: d.t,
            source: PriceSource::Stream,
        })
        .collect()
}

#[derive(Debug)]
enum Command {
    Subscribe(String),
    Unsubscribe(String),
}

struct Inner {
    api_key: Option<String>,
    config: StreamConfig,
    events: broadcast::Sender<StreamEvent>,
    /// Symbols to (re)subscribe on every connect
    pending: DashSet<String>,
    /// Symbols that get simulated ticks while disconnected
    simulated: DashSet<String>,
    last_prices: DashMap<String, f64>,
    connected: AtomicBool,
    started: AtomicBool,
    status: RwLock<StreamStatus>,
    commands: mpsc::UnboundedSender<Command>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    shutdown: watch::Sender<bool>,
}

/// Finnhub WebSocket client for real-time stock data.
#[derive(Clone)]
pub struct FinnhubWs {
    inner: Arc<Inner>,
}

impl FinnhubWs {
    /// Create a new client. Without an API key it never connects and only
    /// simulates.
    pub fn new(api_key: Option<String>, config: StreamConfig) -> Self {
        let (events, _) = broadcast::channel(1024);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                api_key: api_key.filter(|k| !k.is_empty()),
                config,
                events,
                pending: DashSet::new(),
                simulated: DashSet::new(),
                last_prices: DashMap::new(),
                connected: AtomicBool::new(false),
                started: AtomicBool::new(false),
                status: RwLock::new(StreamStatus::Idle),
                commands,
                command_rx: Mutex::new(Some(command_rx)),
                shutdown,
            }),
        }
    }

    /// Listen for ticks and status changes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    /// Spawn the connection and simulation tasks. Calling twice is a no-op.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let command_rx = self
            .inner
            .command_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let sim = self.clone();
        tokio::spawn(async move { sim.run_simulation().await });

        match (self.inner.api_key.clone(), command_rx) {
            (Some(api_key), Some(commands)) => {
                let client = self.clone();
                tokio::spawn(async move { client.run(api_key, commands).await });
            }
            _ => {
                info!("No Finnhub API key configured, streaming simulated prices only");
                self.set_status(StreamStatus::Disconnected);
            }
        }
    }

    /// Stop all tasks, close the socket and forget requested symbols.
    pub fn shutdown(&self) {
        self.inner.pending.clear();
        self.inner.simulated.clear();
        self.inner.connected.store(false, Ordering::SeqCst);
        let _ = self.inner.shutdown.send(true);
        info!("Finnhub stream shut down");
    }

    /// Request trades for symbols. Empty symbols are ignored.
    pub fn subscribe(&self, symbols: &[String]) {
        for symbol in symbols.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            self.inner.pending.insert(symbol.to_string());
            self.inner.simulated.insert(symbol.to_string());
            if self.is_connected() {
                let _ = self.inner.commands.send(Command::Subscribe(symbol.to_string()));
            }
        }
    }

    /// Stop receiving trades for symbols.
    pub fn unsubscribe(&self, symbols: &[String]) {
        for symbol in symbols.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            self.inner.pending.remove(symbol);
            self.inner.simulated.remove(symbol);
            if self.is_connected() {
                let _ = self.inner.commands.send(Command::Unsubscribe(symbol.to_string()));
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StreamStatus {
        *self.inner.status.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Last traded or simulated price.
    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.inner.last_prices.get(symbol).map(|p| *p)
    }

    /// Symbols currently requested, sorted.
    pub fn pending_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.inner.pending.iter().map(|s| s.clone()).collect();
        symbols.sort();
        symbols
    }

    fn set_status(&self, status: StreamStatus) {
        {
            let mut current = self.inner.status.write().unwrap_or_else(|e| e.into_inner());
            if *current == status {
                return;
            }
            *current = status;
        }
        let _ = self.inner.events.send(StreamEvent::StatusChanged(status));
    }

    fn publish(&self, tick: Tick) {
        self.inner.last_prices.insert(tick.symbol.clone(), tick.price);
        let _ = self.inner.events.send(StreamEvent::Tick(tick));
    }

    /// One simulated tick for every simulated symbol.
    fn simulate_step(&self) {
        let symbols: Vec<String> = self.inner.simulated.iter().map(|s| s.clone()).collect();
        if symbols.is_empty() {
            return;
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut rng = rand::thread_rng();
        for symbol in symbols {
            let last = self
                .last_price(&symbol)
                .unwrap_or_else(|| simulator::seed_price(&symbol));
            let price = simulator::next_price(last, &mut rng);
            self.publish(Tick {
                symbol,
                price,
                timestamp: now,
                source: PriceSource::Simulated,
            });
        }
    }

    async fn run_simulation(&self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.inner.config.simulation_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.is_connected() {
                        self.simulate_step();
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Simulation task stopped");
    }

    /// Connect, and reconnect with exponential backoff until shut down.
    async fn run(&self, api_key: String, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self
                .run_connection(&api_key, &mut commands, &mut shutdown, &mut attempt)
                .await
            {
                Ok(_) => warn!("Finnhub WebSocket disconnected"),
                Err(e) => error!("Finnhub WebSocket error: {}", e),
            }

            self.inner.connected.store(false, Ordering::SeqCst);
            if *shutdown.borrow() {
                break;
            }
            self.set_status(StreamStatus::Disconnected);

            let delay = reconnect_delay(attempt, self.inner.config.reconnect_max);
            attempt = attempt.saturating_add(1);
            debug!("Reconnecting to Finnhub in {:?}", delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("Finnhub connection task stopped");
    }

    async fn run_connection(
        &self,
        api_key: &str,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        shutdown: &mut watch::Receiver<bool>,
        attempt: &mut u32,
    ) -> anyhow::Result<()> {
        let url = stream_url(&self.inner.config.url, api_key);
        info!("Connecting to Finnhub WebSocket");

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();
        info!("Connected to Finnhub WebSocket");

        *attempt = 0;
        self.inner.connected.store(true, Ordering::SeqCst);

        // Anything queued before this point is covered by the pending set.
        while commands.try_recv().is_ok() {}

        let pending = self.pending_symbols();
        for symbol in &pending {
            send_json(&mut write, "subscribe", symbol).await?;
        }
        if !pending.is_empty() {
            info!("Resubscribed {} symbols on Finnhub WebSocket", pending.len());
        }
        self.set_status(StreamStatus::Connected);

        let period = self.inner.config.ping_interval;
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            for tick in parse_trade_frame(&text) {
                                self.publish(tick);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Finnhub WebSocket closed");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("Finnhub WebSocket read error: {}", e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                Some(command) = commands.recv() => {
                    match command {
                        Command::Subscribe(symbol) => send_json(&mut write, "subscribe", &symbol).await?,
                        Command::Unsubscribe(symbol) => send_json(&mut write, "unsubscribe", &symbol).await?,
                    }
                }
                _ = ping.tick() => {
                    let _ = write.send(Message::Ping(Vec::new())).await;
                }
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn send_json<S>(write: &mut S, msg_type: &str, symbol: &str) -> anyhow::Result<()>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let json = serde_json::to_string(&SubscribeMessage { msg_type, symbol })?;
    write.send(Message::Text(json)).await?;
    debug!("Finnhub {} {}", msg_type, symbol);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_has_root_path() {
        assert_eq!(stream_url(FINNHUB_WS_URL, "k"), "wss://ws.finnhub.io/?token=k");
        assert_eq!(stream_url("ws://127.0.0.1:9000/", "k"), "ws://127.0.0.1:9000/?token=k");
    }

    #[test]
    fn test_subscribe_message_serialization() {
        let msg = SubscribeMessage {
            msg_type: "unsubscribe",
            symbol: "AAPL",
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"unsubscribe","symbol":"AAPL"}"#);
    }

    #[test]
    fn test_parse_trade_frame() {
        let json = r#"{
            "type": "trade",
            "data": [
                {"s": "AAPL", "p": 153.25, "v": 100.0, "t": 1700000000000, "c": ["@", "I"]},
                {"s": "MSFT", "p": 380.50, "t": 1700000000001}
            ]
        }"#;
        let ticks = parse_trade_frame(json);
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].symbol, "AAPL");
        assert_eq!(ticks[0].price, 153.25);
        assert_eq!(ticks[1].timestamp, 1700000000001);
        assert!(ticks.iter().all(|t| t.source == PriceSource::Stream));
    }

    #[test]
    fn test_non_trade_frames_ignored() {
        assert!(parse_trade_frame(r#"{"type":"ping"}"#).is_empty());
        assert!(parse_trade_frame(r#"{"type":"error","msg":"Invalid token"}"#).is_empty());
        assert!(parse_trade_frame("not json").is_empty());
    }

    #[test]
    fn test_subscribe_tracks_symbols_while_disconnected() {
        let ws = FinnhubWs::new(None, StreamConfig::default());
        ws.subscribe(&["AAPL".to_string(), "".to_string(), " MSFT ".to_string()]);
        assert_eq!(ws.pending_symbols(), vec!["AAPL", "MSFT"]);

        ws.unsubscribe(&["AAPL".to_string()]);
        assert_eq!(ws.pending_symbols(), vec!["MSFT"]);
        assert!(!ws.is_connected());
    }

    #[test]
    fn test_simulate_step_emits_ticks() {
        let ws = FinnhubWs::new(None, StreamConfig::default());
        let mut events = ws.subscribe_events();
        ws.subscribe(&["AAPL".to_string()]);

        ws.simulate_step();

        match events.try_recv().unwrap() {
            StreamEvent::Tick(tick) => {
                assert_eq!(tick.symbol, "AAPL");
                assert_eq!(tick.source, PriceSource::Simulated);
                assert!((tick.price - 75.0).abs() <= 75.0 * simulator::MAX_STEP + 0.01);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(ws.last_price("AAPL").is_some());
    }

    #[tokio::test]
    async fn test_start_without_key_reports_disconnected() {
        let ws = FinnhubWs::new(None, StreamConfig::default());
        let mut events = ws.subscribe_events();
        ws.start();

        assert_eq!(ws.status(), StreamStatus::Disconnected);
        assert_eq!(
            events.recv().await.unwrap(),
            StreamEvent::StatusChanged(StreamStatus::Disconnected)
        );
        ws.shutdown();
    }
}
