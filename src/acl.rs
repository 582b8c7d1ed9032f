//! Destination allow-list
//!
//! A static set of IP network prefixes, built once at startup. A destination
//! is permitted iff at least one prefix contains it. Parsing and matching are
//! deliberately separate concerns: `from_list` turns operator input into an
//! `Acl`, `permit` answers for a single address.

use anyhow::{Context, Result};
use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;

/// Immutable set of permitted destination networks
#[derive(Debug, Clone, Default)]
pub struct Acl {
    networks: Vec<IpNet>,
}

impl Acl {
    /// Build an allow-list from a comma-separated list of CIDR prefixes.
    ///
    /// Entries are trimmed; empty entries are skipped so a trailing comma is
    /// harmless. A bare address is accepted as a host-length prefix. Any
    /// malformed entry fails construction.
    pub fn from_list(list: &str) -> Result<Self> {
        let mut networks = Vec::new();
        for entry in list.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let net = parse_prefix(entry)
                .with_context(|| format!("Invalid ACL entry: {}", entry))?;
            networks.push(net);
        }
        Ok(Acl { networks })
    }

    /// Test whether an address falls inside any permitted network
    pub fn permit(&self, addr: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(&addr))
    }

    /// Number of configured prefixes
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Whether the allow-list is empty (denies everything)
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for net in &self.networks {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", net)?;
            first = false;
        }
        Ok(())
    }
}

/// Parse one prefix, accepting a bare IP as a /32 or /128 host net
fn parse_prefix(entry: &str) -> Result<IpNet> {
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net);
    }
    let addr: IpAddr = entry.parse()?;
    let prefix_len = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    Ok(IpNet::new(addr, prefix_len)?)
}
