//! SOCKS5 request parsing
//!
//! Reads the command/address portion of the exchange. Errors carry the reply
//! code the client must receive, so the handler can answer `0x07` for an
//! unsupported command and `0x08` for an unknown address type before closing.

use super::consts::*;
use super::types::{SocksCommand, TargetAddr};
use crate::error::Socks5ReplyCode;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A parsed SOCKS5 request
#[derive(Debug, Clone)]
pub struct SocksRequest {
    /// Requested command
    pub command: SocksCommand,
    /// Destination, in the form the client sent it
    pub target: TargetAddr,
}

/// Request parsing failures
#[derive(Error, Debug)]
pub enum RequestError {
    /// The request header carried a version other than 5
    #[error("Unsupported SOCKS version in request: {0}")]
    UnsupportedVersion(u8),

    /// The command byte maps to no known command
    #[error("Unknown command: {0}")]
    UnknownCommand(u8),

    /// The address type byte maps to no known address type
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// The domain name was empty or not valid UTF-8
    #[error("Invalid domain name")]
    InvalidDomain,

    /// The underlying stream failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RequestError {
    /// The reply code owed to the client, where the protocol defines one
    pub fn reply_code(&self) -> Option<Socks5ReplyCode> {
        match self {
            RequestError::UnknownCommand(_) => Some(Socks5ReplyCode::CommandNotSupported),
            RequestError::AddressTypeNotSupported(_) => {
                Some(Socks5ReplyCode::AddressTypeNotSupported)
            }
            RequestError::InvalidDomain => Some(Socks5ReplyCode::GeneralFailure),
            _ => None,
        }
    }
}

/// Parse a SOCKS5 request from the stream.
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The address is parsed before the command byte is judged, so a request
/// with both a bad address type and a bad command is answered for the
/// address type, as the reply carries no address to echo otherwise.
pub async fn parse_request<S>(stream: &mut S) -> Result<SocksRequest, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    let version = header[0];
    let cmd_byte = header[1];
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        return Err(RequestError::UnsupportedVersion(version));
    }

    let target = parse_address(stream, addr_type).await?;

    let command =
        SocksCommand::from_byte(cmd_byte).ok_or(RequestError::UnknownCommand(cmd_byte))?;

    Ok(SocksRequest { command, target })
}

/// Parse the address portion of a request
async fn parse_address<S>(stream: &mut S, addr_type: u8) -> Result<TargetAddr, RequestError>
where
    S: AsyncRead + Unpin,
{
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(TargetAddr::ipv4(Ipv4Addr::from(addr), port))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            let domain_len = len_buf[0] as usize;

            if domain_len == 0 || domain_len > MAX_DOMAIN_LEN {
                return Err(RequestError::InvalidDomain);
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;
            let domain =
                String::from_utf8(domain_buf).map_err(|_| RequestError::InvalidDomain)?;

            let port = read_port(stream).await?;
            Ok(TargetAddr::domain(domain, port))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(TargetAddr::ipv6(Ipv6Addr::from(addr), port))
        }

        other => Err(RequestError::AddressTypeNotSupported(other)),
    }
}

async fn read_port<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u16, RequestError> {
    let mut port_buf = [0u8; 2];
    stream.read_exact(&mut port_buf).await?;
    Ok(u16::from_be_bytes(port_buf))
}
