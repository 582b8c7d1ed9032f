//! # Ganted - RADIUS-Authenticated SOCKS5 Proxy
//!
//! Ganted is a lightweight SOCKS5 proxy that authenticates every client
//! connection against a RADIUS server, restricts outbound destinations to a
//! static allow-list of network prefixes, counts the bytes relayed per
//! session, and periodically reports aggregated per-user traffic to a RADIUS
//! accounting server.
//!
//! ## Features
//!
//! - **RADIUS Authentication**: USER/PASSWORD sub-negotiation (RFC 1929)
//!   validated by Access-Request exchanges, with a sliding-window positive
//!   cache to keep the RADIUS server off the hot path
//! - **Destination ACL**: mixed IPv4/IPv6 CIDR allow-list enforced on every
//!   CONNECT request
//! - **Traffic Accounting**: per-session byte counters written to an access
//!   log, rotated hourly, aggregated per user, and reported as RADIUS
//!   Accounting-Request Start/Stop pairs
//! - **Compressed Archives**: rotated access logs are concatenated and
//!   zstd-compressed once the configured backlog is reached
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ganted::config::Config;
//! use ganted::server::Server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     let server = Server::bootstrap(&config, &shutdown_tx).await?;
//!     server.run(shutdown_rx).await
//! }
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! SOCKS5 Client -> auth (cache|RADIUS) -> ACL -> Target
//!                        |
//!                 access.log -> hourly rotate -> parse -> accounting -> archive
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod accesslog;
pub mod accounting;
pub mod acl;
pub mod auth;
pub mod config;
pub mod error;
pub mod radius;
pub mod scheduler;
pub mod server;
pub mod socks;

// Re-export commonly used items
pub use config::Config;
pub use error::{Socks5Error, Socks5ReplyCode};
pub use server::Server;

/// Version of the Ganted library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
