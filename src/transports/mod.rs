//! Connections to the matchmaking service.
//!
//! | Feature                | Connection              | Matchmaking              |
//! |------------------------|-------------------------|--------------------------|
//! | `transport-websocket`  | [`WebSocketConnection`] | [`WebSocketMatchmaking`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnection, WebSocketMatchmaking};
