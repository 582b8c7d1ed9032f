//! SOCKS5 protocol engine
//!
//! Per-connection state machine for the server side of RFC 1928 with the
//! RFC 1929 username/password sub-negotiation. Only the CONNECT command is
//! admitted; destinations are gated by the allow-list and every relayed
//! session is byte-counted for the access log.

pub mod auth;
pub mod conduit;
pub mod consts;
pub mod handler;
pub mod relay;
pub mod request;
pub mod reply;
pub mod types;

pub use conduit::{ByteCounters, CountedStream};
pub use handler::{serve_conn, ProxyContext};
pub use types::{SocksCommand, TargetAddr};
