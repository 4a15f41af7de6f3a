pub mod finnhub;
pub mod finnhub_ws;
pub mod simulator;

pub use finnhub::{FinnhubClient, QuoteError};
pub use finnhub_ws::{FinnhubWs, StreamConfig};
