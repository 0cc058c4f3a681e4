//! Streaming module - real-time WebSocket channel and subscriber commands

mod commands;
mod websocket;

pub use commands::{parse, Command, Dispatcher, Rejected};
pub use websocket::WebSocketServer;
