//! Per-connection SOCKS5 state machine
//!
//! Drives one accepted connection from greeting through relay teardown:
//! authenticate, parse the request, gate it through the allow-list, dial the
//! upstream and relay. A session whose relay completes cleanly leaves
//! exactly one access record behind; a session that fails mid-relay, or in
//! any earlier phase, leaves none.

use super::auth;
use super::conduit::CountedStream;
use super::relay;
use super::reply::send_reply;
use super::request::parse_request;
use super::types::SocksCommand;
use crate::accesslog::{AccessLogger, AccessRecord};
use crate::acl::Acl;
use crate::auth::Validator;
use crate::error::Socks5ReplyCode;
use anyhow::{Context, Result};
use chrono::Local;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

/// Shared state every connection task needs
pub struct ProxyContext {
    /// Credential validator; `None` runs the listener in NO-AUTH mode
    pub validator: Option<Arc<Validator>>,
    /// Destination allow-list
    pub acl: Acl,
    /// Optional source IP for upstream dials
    pub bind_output: Option<IpAddr>,
    /// Access log sink
    pub access_log: Arc<AccessLogger>,
}

/// Serve one SOCKS5 connection end to end.
///
/// Protocol and policy failures answer with the appropriate reply code where
/// the protocol defines one and return; errors never escape the connection
/// task beyond its log line.
pub async fn serve_conn<S>(mut stream: S, peer: SocketAddr, ctx: Arc<ProxyContext>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let username = auth::authenticate(&mut stream, ctx.validator.as_deref()).await?;

    let request = match parse_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            if let Some(code) = e.reply_code() {
                let _ = send_reply(&mut stream, code, None).await;
            }
            return Err(e.into());
        }
    };

    if request.command != SocksCommand::Connect {
        info!(
            "{} requested unsupported command {} for {}",
            peer, request.command, request.target
        );
        send_reply(&mut stream, Socks5ReplyCode::CommandNotSupported, None).await?;
        return Ok(());
    }

    let upstream = match relay::establish(&request.target, &ctx.acl, ctx.bind_output).await {
        Ok(upstream) => upstream,
        Err(code) => {
            send_reply(&mut stream, code, None).await?;
            return Ok(());
        }
    };

    let bind_addr = upstream.local_addr().ok();
    send_reply(&mut stream, Socks5ReplyCode::Succeeded, bind_addr).await?;

    info!("Accept: {:?}, {}, {}", username, peer, request.target);

    // Counters attach here so the record reflects relay payload only.
    let counted = CountedStream::new(stream);
    let counters = counted.counters();

    // A relay that dies to an I/O error is not logged as a session; only a
    // clean completion reaches the access log.
    relay::relay(counted, upstream)
        .await
        .with_context(|| "Relay failed")?;

    let record = AccessRecord {
        remote: peer,
        username,
        timestamp: Local::now(),
        destination: request.target.to_string(),
        read_bytes: counters.read_bytes(),
        write_bytes: counters.write_bytes(),
    };
    if let Err(e) = ctx.access_log.append(&record) {
        warn!("Failed to write access record: {}", e);
    }

    Ok(())
}
