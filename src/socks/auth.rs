//! SOCKS5 authentication negotiation
//!
//! Handles the method-selection greeting and the RFC 1929 username/password
//! sub-negotiation. Which method is on offer depends on configuration: with
//! RADIUS credentials configured only USER/PASSWORD is acceptable, otherwise
//! only NO-AUTH.

use super::consts::*;
use crate::auth::Validator;
use crate::error::Socks5Error;
use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Username recorded for sessions on the NO-AUTH method.
///
/// The access-log line is whitespace-separated; an empty token would shift
/// every later field, so anonymous sessions get a placeholder.
pub const ANONYMOUS_USER: &str = "-";

/// Negotiate the authentication method and authenticate the client.
///
/// # Protocol Flow
///
/// 1. Read the client greeting (version, method count, methods)
/// 2. Select the single supported method, or answer `05 FF` and fail
/// 3. For USER/PASSWORD, run the RFC 1929 sub-negotiation against the
///    validator
///
/// Returns the authenticated username ([`ANONYMOUS_USER`] for NO-AUTH).
pub async fn authenticate<S>(stream: &mut S, validator: Option<&Validator>) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    if num_methods == 0 {
        bail!("No authentication methods provided");
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    let wanted = match validator {
        Some(_) => SOCKS5_AUTH_METHOD_PASSWORD,
        None => SOCKS5_AUTH_METHOD_NONE,
    };

    if !methods.contains(&wanted) {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        return Err(Socks5Error::NoAcceptableMethod.into());
    }

    stream.write_all(&[SOCKS5_VERSION, wanted]).await?;
    stream.flush().await?;

    match validator {
        Some(validator) => authenticate_password(stream, validator).await,
        None => Ok(ANONYMOUS_USER.to_string()),
    }
}

/// RFC 1929 username/password sub-negotiation.
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds `{ver=1, status}` where status 0 means success.
async fn authenticate_password<S>(stream: &mut S, validator: &Validator) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let username_len = buf[1] as usize;

    if version != SOCKS5_AUTH_VERSION {
        send_auth_status(stream, SOCKS5_AUTH_FAILURE).await?;
        bail!("Invalid auth sub-negotiation version: {}", version);
    }

    if username_len == 0 {
        send_auth_status(stream, SOCKS5_AUTH_FAILURE).await?;
        bail!("Invalid username length: {}", username_len);
    }

    let mut username = vec![0u8; username_len];
    stream.read_exact(&mut username).await?;
    let username = String::from_utf8(username)?;

    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf).await?;
    let password_len = buf[0] as usize;

    if password_len == 0 {
        send_auth_status(stream, SOCKS5_AUTH_FAILURE).await?;
        bail!("Invalid password length: {}", password_len);
    }

    let mut password = vec![0u8; password_len];
    stream.read_exact(&mut password).await?;
    let password = String::from_utf8(password)?;

    if validator.validate(&username, &password).await {
        send_auth_status(stream, SOCKS5_AUTH_SUCCESS).await?;
        debug!("Authentication successful for user: {}", username);
        Ok(username)
    } else {
        send_auth_status(stream, SOCKS5_AUTH_FAILURE).await?;
        Err(Socks5Error::AuthFailed(username).into())
    }
}

async fn send_auth_status<S: AsyncWrite + Unpin>(stream: &mut S, status: u8) -> Result<()> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}
