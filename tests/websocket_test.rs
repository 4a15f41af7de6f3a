//! WebSocket room tests
//!
//! Tests cover:
//! - Client registration and subscription bookkeeping
//! - Per-symbol broadcast and status fan-out
//! - Client message parsing and server message shapes

use point_market::types::*;
use point_market::websocket::RoomManager;
use tokio::sync::mpsc;

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Room Manager
// =============================================================================

mod room_tests {
    use super::*;

    #[test]
    fn test_subscribe_normalizes_and_dedupes() {
        let rooms = RoomManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = rooms.register(tx);

        let added = rooms.subscribe(client, &symbols(&["aapl", "AAPL", " msft ", ""]));
        assert_eq!(added, symbols(&["AAPL", "MSFT"]));
        assert!(rooms.subscribe(client, &symbols(&["AAPL"])).is_empty());
        assert_eq!(rooms.active_symbols(), symbols(&["AAPL", "MSFT"]));
    }

    #[test]
    fn test_unsubscribe_drops_empty_rooms() {
        let rooms = RoomManager::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let a = rooms.register(tx1);
        let b = rooms.register(tx2);

        rooms.subscribe(a, &symbols(&["AAPL"]));
        rooms.subscribe(b, &symbols(&["AAPL", "TSLA"]));
        assert_eq!(rooms.room_count(), 2);

        assert_eq!(rooms.unsubscribe(b, &symbols(&["tsla", "NFLX"])), symbols(&["TSLA"]));
        assert_eq!(rooms.room_count(), 1);
        assert_eq!(rooms.get_subscribers("AAPL").len(), 2);
    }

    #[test]
    fn test_unregister_returns_symbols() {
        let rooms = RoomManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = rooms.register(tx);
        rooms.subscribe(client, &symbols(&["MSFT", "AAPL"]));

        assert_eq!(rooms.unregister(client), symbols(&["AAPL", "MSFT"]));
        assert_eq!(rooms.client_count(), 0);
        assert_eq!(rooms.room_count(), 0);
        assert!(rooms.unregister(client).is_empty());
    }

    #[test]
    fn test_broadcast_reaches_only_room_members() {
        let rooms = RoomManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let a = rooms.register(tx1);
        let b = rooms.register(tx2);
        rooms.subscribe(a, &symbols(&["AAPL"]));
        rooms.subscribe(b, &symbols(&["MSFT"]));

        rooms.broadcast("AAPL", "tick");
        assert_eq!(rx1.try_recv().unwrap(), "tick");
        assert!(rx2.try_recv().is_err());

        rooms.broadcast_all("status");
        assert_eq!(rx1.try_recv().unwrap(), "status");
        assert_eq!(rx2.try_recv().unwrap(), "status");
    }

    #[test]
    fn test_send_to_unknown_client() {
        let rooms = RoomManager::new();
        assert!(!rooms.send_to(uuid::Uuid::new_v4(), "hello"));
    }
}

// =============================================================================
// Messages
// =============================================================================

mod message_tests {
    use super::*;

    #[test]
    fn test_unsubscribe_message_parsing() {
        let json = r#"{"type":"unsubscribe","symbols":["AAPL"]}"#;
        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::Unsubscribe { symbols } => assert_eq!(symbols, vec!["AAPL"]),
            other => panic!("Expected Unsubscribe, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"order","symbols":[]}"#).is_err());
    }

    #[test]
    fn test_price_update_shape() {
        let msg = ServerMessage::PriceUpdate {
            data: PriceUpdateData {
                symbol: "AAPL".to_string(),
                price: 190.25,
                previous_price: Some(190.0),
                timestamp: 1_700_000_000_000,
                source: PriceSource::Stream,
            },
        };
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "price_update");
        assert_eq!(value["data"]["symbol"], "AAPL");
        assert_eq!(value["data"]["previousPrice"], 190.0);
    }

    #[test]
    fn test_stream_status_shape() {
        let msg = ServerMessage::StreamStatus {
            status: StreamStatus::Disconnected,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "stream_status");
        assert_eq!(value["status"], "disconnected");
    }
}
