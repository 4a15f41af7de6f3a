use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A client's subscription information.
pub struct ClientSubscription {
    /// Subscribed ticker symbols (uppercase).
    pub symbols: HashSet<String>,
    /// Channel to send messages to the client.
    pub tx: mpsc::UnboundedSender<String>,
}

/// Manages WebSocket client subscriptions.
pub struct RoomManager {
    /// Client subscriptions keyed by client ID.
    pub clients: DashMap<Uuid, ClientSubscription>,
    /// Symbol rooms: ticker -> set of client IDs.
    rooms: DashMap<String, HashSet<Uuid>>,
}

fn normalize(symbol: &str) -> Option<String> {
    let symbol = symbol.trim().to_uppercase();
    (!symbol.is_empty()).then_some(symbol)
}

impl RoomManager {
    /// Create a new room manager.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new client.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let client_id = Uuid::new_v4();
        self.clients.insert(
            client_id,
            ClientSubscription {
                symbols: HashSet::new(),
                tx,
            },
        );
        client_id
    }

    /// Unregister a client and remove it from all rooms.
    ///
    /// Returns the symbols the client was subscribed to.
    pub fn unregister(&self, client_id: Uuid) -> Vec<String> {
        let Some((_, subscription)) = self.clients.remove(&client_id) else {
            return Vec::new();
        };

        let mut symbols: Vec<String> = subscription.symbols.into_iter().collect();
        for symbol in &symbols {
            self.leave_room(symbol, client_id);
        }
        symbols.sort();
        symbols
    }

    /// Subscribe a client to symbols. Returns the newly added symbols.
    pub fn subscribe(&self, client_id: Uuid, symbols: &[String]) -> Vec<String> {
        let mut subscribed = Vec::new();

        if let Some(mut client) = self.clients.get_mut(&client_id) {
            for symbol in symbols.iter().filter_map(|s| normalize(s)) {
                if client.symbols.insert(symbol.clone()) {
                    self.rooms
                        .entry(symbol.clone())
                        .or_default()
                        .insert(client_id);
                    subscribed.push(symbol);
                }
            }
        }

        subscribed
    }

    /// Unsubscribe a client from symbols. Returns the symbols removed.
    pub fn unsubscribe(&self, client_id: Uuid, symbols: &[String]) -> Vec<String> {
        let mut unsubscribed = Vec::new();

        if let Some(mut client) = self.clients.get_mut(&client_id) {
            for symbol in symbols.iter().filter_map(|s| normalize(s)) {
                if client.symbols.remove(&symbol) {
                    self.leave_room(&symbol, client_id);
                    unsubscribed.push(symbol);
                }
            }
        }

        unsubscribed
    }

    fn leave_room(&self, symbol: &str, client_id: Uuid) {
        if let Some(mut room) = self.rooms.get_mut(symbol) {
            room.remove(&client_id);
        }
        self.rooms.remove_if(symbol, |_, room| room.is_empty());
    }

    /// Send a message to one client.
    pub fn send_to(&self, client_id: Uuid, message: &str) -> bool {
        match self.clients.get(&client_id) {
            Some(client) => client.tx.send(message.to_string()).is_ok(),
            None => false,
        }
    }

    /// Get all clients subscribed to a symbol.
    pub fn get_subscribers(&self, symbol: &str) -> Vec<mpsc::UnboundedSender<String>> {
        let client_ids: Vec<Uuid> = self
            .rooms
            .get(symbol)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default();

        client_ids
            .iter()
            .filter_map(|id| self.clients.get(id).map(|c| c.tx.clone()))
            .collect()
    }

    /// Broadcast a message to all clients subscribed to a symbol.
    pub fn broadcast(&self, symbol: &str, message: &str) {
        for tx in self.get_subscribers(symbol) {
            let _ = tx.send(message.to_string());
        }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast_all(&self, message: &str) {
        for client in self.clients.iter() {
            let _ = client.tx.send(message.to_string());
        }
    }

    /// Get the number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Get the number of symbols with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Get all symbols that have at least one subscriber, sorted.
    pub fn active_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.rooms.iter().map(|r| r.key().clone()).collect();
        symbols.sort();
        symbols
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
        }
    }
}
