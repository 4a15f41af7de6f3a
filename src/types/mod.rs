pub mod auth;
pub mod market;
pub mod trading;
pub mod ws;

pub use auth::*;
pub use market::*;
pub use trading::*;
pub use ws::*;
