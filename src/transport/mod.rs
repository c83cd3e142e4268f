//! The `transport` module is responsible for network communication with
//! publishers and subscribers over WebSockets.
//!
//! It defines the JSON frames of the broker protocol and implements the
//! server that maps each connection onto one broker call.

pub mod message;
pub mod websocket;

pub use message::{ClientFrame, ServerFrame};
pub use websocket::{serve, start_websocket_server};

#[cfg(test)]
mod tests;
