//! Configuration module for Ganted
//!
//! All functional configuration is read from the environment. Parsing is
//! split from lookup so the table can be validated without touching process
//! globals.

use anyhow::{bail, Context, Result};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration assembled from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the SOCKS5 listener binds to (`GANTED_LISTEN`)
    pub listen: SocketAddr,
    /// Comma-separated CIDR allow-list for destinations (`GANTED_ACL`)
    pub acl: String,
    /// Optional source IP for upstream dials (`GANTED_BIND_OUTPUT`)
    pub bind_output: Option<IpAddr>,
    /// Sliding-window TTL for the positive auth cache (`GANTED_AUTH_CACHE_RETENTION`)
    pub auth_cache_retention: Duration,
    /// Interval between auth cache sweeps (`GANTED_AUTH_CACHE_GC`)
    pub auth_cache_gc: Duration,
    /// Directory holding access logs, rotations and archives (`GANTED_LOG_DIR`)
    pub log_dir: PathBuf,
    /// RADIUS authentication endpoint (`RADIUS_SERVER`)
    pub radius_server: SocketAddr,
    /// RADIUS accounting endpoint (`RADIUS_ACCOUNTING_SERVER`)
    pub radius_accounting_server: SocketAddr,
    /// Shared secret for both RADIUS endpoints (`RADIUS_SECRET`)
    pub radius_secret: String,
    /// NAS-Identifier attribute for accounting packets (`NAS_IDENTIFIER`)
    pub nas_identifier: String,
}

impl Config {
    /// Assemble the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Assemble the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let listen: SocketAddr = get("GANTED_LISTEN", "127.0.0.1:6626")
            .parse()
            .with_context(|| "Invalid GANTED_LISTEN address")?;

        let bind_output = match get("GANTED_BIND_OUTPUT", "") {
            s if s.is_empty() => None,
            s => Some(
                s.parse::<IpAddr>()
                    .with_context(|| "Invalid GANTED_BIND_OUTPUT address")?,
            ),
        };

        let auth_cache_retention = parse_duration(&get("GANTED_AUTH_CACHE_RETENTION", "10m"))
            .with_context(|| "Invalid GANTED_AUTH_CACHE_RETENTION")?;
        let auth_cache_gc = parse_duration(&get("GANTED_AUTH_CACHE_GC", "10m"))
            .with_context(|| "Invalid GANTED_AUTH_CACHE_GC")?;

        let radius_server: SocketAddr = get("RADIUS_SERVER", "127.0.0.1:1812")
            .parse()
            .with_context(|| "Invalid RADIUS_SERVER address")?;
        let radius_accounting_server: SocketAddr = get("RADIUS_ACCOUNTING_SERVER", "127.0.0.1:1813")
            .parse()
            .with_context(|| "Invalid RADIUS_ACCOUNTING_SERVER address")?;

        Ok(Config {
            listen,
            acl: get("GANTED_ACL", ""),
            bind_output,
            auth_cache_retention,
            auth_cache_gc,
            log_dir: PathBuf::from(get("GANTED_LOG_DIR", "/var/log/ganted")),
            radius_server,
            radius_accounting_server,
            radius_secret: get("RADIUS_SECRET", ""),
            nas_identifier: get("NAS_IDENTIFIER", "ganted"),
        })
    }

    /// Whether RADIUS credentials are configured.
    ///
    /// Without a shared secret the server cannot validate passwords and
    /// falls back to the NO-AUTH method.
    pub fn has_credentials(&self) -> bool {
        !self.radius_secret.is_empty()
    }
}

/// Parse a duration in the `10m` / `90s` / `1h30m` form.
///
/// Accepted units are `s`, `m` and `h`; segments may be concatenated and are
/// summed. A bare number without a unit is rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if digits.is_empty() {
            bail!("invalid duration: {}", input);
        }
        let value: u64 = digits.parse()?;
        digits.clear();
        let unit = match ch {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => bail!("unknown duration unit '{}' in: {}", ch, input),
        };
        total += Duration::from_secs(value * unit);
    }
    if !digits.is_empty() {
        bail!("duration missing unit: {}", input);
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let vars = HashMap::new();
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(config.listen, "127.0.0.1:6626".parse().unwrap());
        assert_eq!(config.acl, "");
        assert!(config.bind_output.is_none());
        assert_eq!(config.auth_cache_retention, Duration::from_secs(600));
        assert_eq!(config.auth_cache_gc, Duration::from_secs(600));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/ganted"));
        assert_eq!(config.radius_server, "127.0.0.1:1812".parse().unwrap());
        assert_eq!(
            config.radius_accounting_server,
            "127.0.0.1:1813".parse().unwrap()
        );
        assert_eq!(config.nas_identifier, "ganted");
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_full_environment() {
        let mut vars = HashMap::new();
        vars.insert("GANTED_LISTEN", "0.0.0.0:1080");
        vars.insert("GANTED_ACL", "192.0.2.0/24,2001:db8::/32");
        vars.insert("GANTED_BIND_OUTPUT", "10.0.0.9");
        vars.insert("GANTED_AUTH_CACHE_RETENTION", "5m");
        vars.insert("GANTED_AUTH_CACHE_GC", "30s");
        vars.insert("GANTED_LOG_DIR", "/tmp/ganted-logs");
        vars.insert("RADIUS_SERVER", "192.0.2.1:1812");
        vars.insert("RADIUS_ACCOUNTING_SERVER", "192.0.2.1:1813");
        vars.insert("RADIUS_SECRET", "s3cr3t");
        vars.insert("NAS_IDENTIFIER", "ganted-eu1");

        let config = Config::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(config.listen, "0.0.0.0:1080".parse().unwrap());
        assert_eq!(config.bind_output, Some("10.0.0.9".parse().unwrap()));
        assert_eq!(config.auth_cache_retention, Duration::from_secs(300));
        assert_eq!(config.auth_cache_gc, Duration::from_secs(30));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/ganted-logs"));
        assert_eq!(config.nas_identifier, "ganted-eu1");
        assert!(config.has_credentials());
    }

    #[test]
    fn test_invalid_listen_address() {
        let mut vars = HashMap::new();
        vars.insert("GANTED_LISTEN", "not-an-address");
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_invalid_bind_output() {
        let mut vars = HashMap::new();
        vars.insert("GANTED_BIND_OUTPUT", "10.0.0.9:80");
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_invalid_retention() {
        let mut vars = HashMap::new();
        vars.insert("GANTED_AUTH_CACHE_RETENTION", "soon");
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_parse_duration_simple() {
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_duration_compound() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::from_secs(5400)
        );
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("m10").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("ten minutes").is_err());
    }
}
