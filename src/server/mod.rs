//! mTLS-terminating HTTP/WebSocket server: listener, TLS config, and the
//! request router.

pub mod http;
pub mod tls;
pub mod websocket;

pub use http::{run, AppState};
