mod handler;
mod room_manager;

pub use handler::{spawn_fanout, ws_handler};
pub use room_manager::RoomManager;
