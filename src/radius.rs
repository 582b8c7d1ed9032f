//! RADIUS client wrapper
//!
//! Thin layer over the `radius` crate covering the two exchanges this server
//! needs: Access-Request for credential validation and Accounting-Request
//! Start/Stop pairs for usage reporting. The two operations are exposed as
//! traits so callers can be exercised against in-process fakes.

use anyhow::{bail, Result};
use async_trait::async_trait;
use radius::client::Client;
use radius::core::code::Code;
use radius::core::packet::Packet;
use radius::core::{rfc2865, rfc2866};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Per-exchange timeout for RADIUS round-trips
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of an Access-Request exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// The RADIUS server accepted the credentials
    Accept,
    /// The RADIUS server rejected the credentials (or answered with any
    /// code other than Access-Accept)
    Reject,
}

/// Issues Access-Request exchanges against an authentication endpoint
#[async_trait]
pub trait AccessRequester: Send + Sync {
    /// Validate a username/password pair.
    ///
    /// `Err` means the exchange itself failed (timeout, transport); callers
    /// must treat that as a denial, never as an acceptance.
    async fn access_request(&self, username: &str, password: &str) -> Result<AccessDecision>;
}

/// Emits aggregated usage as Accounting-Request Start/Stop pairs
#[async_trait]
pub trait AccountingSink: Send + Sync {
    /// Report the total bytes relayed for one user as a Start/Stop pair
    /// sharing a single session id.
    async fn send_usage(&self, username: &str, total_bytes: u64) -> Result<()>;
}

/// RADIUS client bound to one authentication and one accounting endpoint
pub struct RadiusClient {
    auth_addr: SocketAddr,
    accounting_addr: SocketAddr,
    secret: Vec<u8>,
    nas_identifier: String,
    client: Client,
    session_seq: AtomicU64,
}

impl RadiusClient {
    /// Create a client for the given endpoints and shared secret
    pub fn new(
        auth_addr: SocketAddr,
        accounting_addr: SocketAddr,
        secret: &str,
        nas_identifier: &str,
    ) -> Self {
        RadiusClient {
            auth_addr,
            accounting_addr,
            secret: secret.as_bytes().to_vec(),
            nas_identifier: nas_identifier.to_string(),
            client: Client::new(Some(EXCHANGE_TIMEOUT), Some(EXCHANGE_TIMEOUT)),
            session_seq: AtomicU64::new(0),
        }
    }

    /// Produce a session id shared by one Start/Stop pair.
    ///
    /// Unix seconds alone collide when two users are emitted within the same
    /// second, so a process-wide sequence number is appended.
    fn next_session_id(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let seq = self.session_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", now, seq)
    }

    /// Build an accounting packet skeleton carrying the shared attributes
    fn accounting_packet(&self, username: &str, session_id: &str) -> Packet {
        let mut packet = Packet::new(Code::AccountingRequest, &self.secret);
        rfc2865::add_user_name(&mut packet, username);
        rfc2865::add_nas_identifier(&mut packet, &self.nas_identifier);
        rfc2866::add_acct_session_id(&mut packet, session_id);
        packet
    }
}

#[async_trait]
impl AccessRequester for RadiusClient {
    async fn access_request(&self, username: &str, password: &str) -> Result<AccessDecision> {
        let mut packet = Packet::new(Code::AccessRequest, &self.secret);
        rfc2865::add_user_name(&mut packet, username);
        rfc2865::add_user_password(&mut packet, password.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to encode User-Password: {}", e))?;

        let response = self
            .client
            .send_packet(&self.auth_addr, &packet)
            .await
            .map_err(|e| anyhow::anyhow!("Access-Request exchange failed: {}", e))?;

        match response.get_code() {
            Code::AccessAccept => Ok(AccessDecision::Accept),
            code => {
                debug!("Access-Request for {} answered with {:?}", username, code);
                Ok(AccessDecision::Reject)
            }
        }
    }
}

#[async_trait]
impl AccountingSink for RadiusClient {
    async fn send_usage(&self, username: &str, total_bytes: u64) -> Result<()> {
        let session_id = self.next_session_id();
        debug!(
            "Sending accounting pair for {}, session {}, {} bytes",
            username, session_id, total_bytes
        );

        let mut start = self.accounting_packet(username, &session_id);
        rfc2866::add_acct_status_type(&mut start, rfc2866::ACCT_STATUS_TYPE_START);

        let reply = self
            .client
            .send_packet(&self.accounting_addr, &start)
            .await
            .map_err(|e| anyhow::anyhow!("Accounting Start exchange failed: {}", e))?;
        if reply.get_code() != Code::AccountingResponse {
            bail!(
                "Unexpected response to Accounting Start: {:?}",
                reply.get_code()
            );
        }

        // TODO: confirm with the billing side whether the Stop record should
        // also carry Acct-Input-Octets; today the whole aggregate is reported
        // as output octets.
        let mut stop = self.accounting_packet(username, &session_id);
        rfc2866::add_acct_status_type(&mut stop, rfc2866::ACCT_STATUS_TYPE_STOP);
        rfc2866::add_acct_output_octets(&mut stop, total_bytes as u32);

        let reply = self
            .client
            .send_packet(&self.accounting_addr, &stop)
            .await
            .map_err(|e| anyhow::anyhow!("Accounting Stop exchange failed: {}", e))?;
        if reply.get_code() != Code::AccountingResponse {
            bail!(
                "Unexpected response to Accounting Stop: {:?}",
                reply.get_code()
            );
        }

        Ok(())
    }
}
