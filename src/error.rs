//! Error types for Ganted
//!
//! Typed errors for the SOCKS5 protocol surface. Operational paths use
//! `anyhow` with context; the enums here exist where a caller needs to match
//! on the failure or map it onto a wire reply code.

use std::io;
use thiserror::Error;

/// SOCKS5 protocol errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Authentication failed
    #[error("Authentication failed for user: {0}")]
    AuthFailed(String),
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl From<&io::Error> for Socks5ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Socks5ReplyCode::ConnectionRefused,
            io::ErrorKind::TimedOut => Socks5ReplyCode::HostUnreachable,
            io::ErrorKind::AddrNotAvailable => Socks5ReplyCode::HostUnreachable,
            io::ErrorKind::PermissionDenied => Socks5ReplyCode::ConnectionNotAllowed,
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_reply_code_to_u8() {
        assert_eq!(u8::from(Socks5ReplyCode::Succeeded), 0x00);
        assert_eq!(u8::from(Socks5ReplyCode::GeneralFailure), 0x01);
        assert_eq!(u8::from(Socks5ReplyCode::ConnectionNotAllowed), 0x02);
        assert_eq!(u8::from(Socks5ReplyCode::NetworkUnreachable), 0x03);
        assert_eq!(u8::from(Socks5ReplyCode::HostUnreachable), 0x04);
        assert_eq!(u8::from(Socks5ReplyCode::ConnectionRefused), 0x05);
        assert_eq!(u8::from(Socks5ReplyCode::TtlExpired), 0x06);
        assert_eq!(u8::from(Socks5ReplyCode::CommandNotSupported), 0x07);
        assert_eq!(u8::from(Socks5ReplyCode::AddressTypeNotSupported), 0x08);
    }

    #[test]
    fn test_socks5_reply_code_from_io_error() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            Socks5ReplyCode::from(&err),
            Socks5ReplyCode::ConnectionRefused
        );

        let err = io::Error::new(io::ErrorKind::TimedOut, "timeout");
        assert_eq!(Socks5ReplyCode::from(&err), Socks5ReplyCode::HostUnreachable);

        let err = io::Error::new(io::ErrorKind::AddrNotAvailable, "addr not available");
        assert_eq!(Socks5ReplyCode::from(&err), Socks5ReplyCode::HostUnreachable);

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            Socks5ReplyCode::from(&err),
            Socks5ReplyCode::ConnectionNotAllowed
        );

        let err = io::Error::new(io::ErrorKind::Other, "other");
        assert_eq!(Socks5ReplyCode::from(&err), Socks5ReplyCode::GeneralFailure);
    }

    #[test]
    fn test_socks5_error_display() {
        let err = Socks5Error::UnsupportedVersion(4);
        assert_eq!(format!("{}", err), "Unsupported SOCKS version: 4");

        let err = Socks5Error::NoAcceptableMethod;
        assert_eq!(format!("{}", err), "No acceptable authentication method");

        let err = Socks5Error::AuthFailed("alice".to_string());
        assert_eq!(format!("{}", err), "Authentication failed for user: alice");
    }
}
