//! Upstream connection establishment and bidirectional relay
//!
//! Resolution happens once per request, the allow-list is tested against the
//! resolved address, and the dial may be pinned to a configured source IP.
//! The relay streams through bounded copy buffers and ends as soon as either
//! direction observes EOF or an error.

use super::consts::CONNECT_TIMEOUT_SECS;
use super::types::TargetAddr;
use crate::acl::Acl;
use crate::error::Socks5ReplyCode;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, info, warn};

/// Resolve the target, enforce the allow-list and dial the upstream.
///
/// On failure the returned reply code is what the client must be told:
/// `0x04` for resolution failures and dial timeouts, `0x02` for allow-list
/// rejections, and the io-error mapping (`0x05`, `0x03`, ...) for dial
/// failures.
pub async fn establish(
    target: &TargetAddr,
    acl: &Acl,
    bind_output: Option<IpAddr>,
) -> Result<TcpStream, Socks5ReplyCode> {
    let resolved = match target.resolve().await {
        Ok(addr) => addr,
        Err(e) => {
            info!("Failed to resolve {}: {}", target, e);
            return Err(Socks5ReplyCode::HostUnreachable);
        }
    };

    if !acl.permit(resolved.ip()) {
        info!("Destination {} ({}) not in allow-list", target, resolved);
        return Err(Socks5ReplyCode::ConnectionNotAllowed);
    }

    let stream = dial(resolved, bind_output).await?;
    debug!("Connected to upstream {}", resolved);
    Ok(stream)
}

/// Dial the resolved address, optionally from a pinned source IP
async fn dial(
    resolved: SocketAddr,
    bind_output: Option<IpAddr>,
) -> Result<TcpStream, Socks5ReplyCode> {
    let socket = match resolved {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(|e| {
        warn!("Failed to create outbound socket: {}", e);
        Socks5ReplyCode::GeneralFailure
    })?;

    if let Some(ip) = bind_output {
        // A source address of the other family cannot carry this dial.
        if ip.is_ipv4() == resolved.is_ipv4() {
            socket.bind(SocketAddr::new(ip, 0)).map_err(|e| {
                warn!("Failed to bind outbound socket to {}: {}", ip, e);
                Socks5ReplyCode::GeneralFailure
            })?;
        } else {
            debug!("Skipping source bind {} for {} dial", ip, resolved);
        }
    }

    let timeout = Duration::from_secs(CONNECT_TIMEOUT_SECS);
    match tokio::time::timeout(timeout, socket.connect(resolved)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            info!("Failed to connect to {}: {}", resolved, e);
            Err(Socks5ReplyCode::from(&e))
        }
        Err(_) => {
            info!("Connection timeout to {}", resolved);
            Err(Socks5ReplyCode::HostUnreachable)
        }
    }
}

/// Relay data bidirectionally between the client and the upstream.
///
/// The two directions are copied concurrently; when either finishes, both
/// sides are torn down. EOF on either side is a clean end; an I/O error is
/// reported to the caller, which distinguishes a completed session from one
/// that died mid-relay.
pub async fn relay<C, U>(client: C, upstream: U) -> std::io::Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let client_to_upstream = tokio::io::copy(&mut client_read, &mut upstream_write);
    let upstream_to_client = tokio::io::copy(&mut upstream_read, &mut client_write);

    tokio::select! {
        result = client_to_upstream => {
            match result {
                Ok(bytes) => {
                    debug!("client->upstream finished: {} bytes", bytes);
                    Ok(())
                }
                Err(e) => {
                    debug!("client->upstream error: {}", e);
                    Err(e)
                }
            }
        }
        result = upstream_to_client => {
            match result {
                Ok(bytes) => {
                    debug!("upstream->client finished: {} bytes", bytes);
                    Ok(())
                }
                Err(e) => {
                    debug!("upstream->client error: {}", e);
                    Err(e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_establish_denied_by_acl() {
        let acl = Acl::from_list("192.0.2.0/24").unwrap();
        let target = TargetAddr::ipv4("203.0.113.1".parse().unwrap(), 80);

        let err = establish(&target, &acl, None).await.unwrap_err();
        assert_eq!(err, Socks5ReplyCode::ConnectionNotAllowed);
    }

    #[tokio::test]
    async fn test_establish_resolution_failure() {
        let acl = Acl::from_list("0.0.0.0/0").unwrap();
        let target = TargetAddr::domain("does-not-exist-9231.invalid".to_string(), 80);

        let err = establish(&target, &acl, None).await.unwrap_err();
        assert_eq!(err, Socks5ReplyCode::HostUnreachable);
    }

    #[tokio::test]
    async fn test_establish_connection_refused() {
        // Grab a free port, then close the listener so the dial is refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let acl = Acl::from_list("127.0.0.0/8").unwrap();
        let target = TargetAddr::Ip(addr);

        let err = establish(&target, &acl, None).await.unwrap_err();
        assert_eq!(err, Socks5ReplyCode::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_establish_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let acl = Acl::from_list("127.0.0.0/8").unwrap();
        let target = TargetAddr::Ip(addr);

        let stream = establish(&target, &acl, None).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn test_establish_with_source_bind() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let acl = Acl::from_list("127.0.0.0/8").unwrap();
        let target = TargetAddr::Ip(addr);

        let stream = establish(&target, &acl, Some("127.0.0.1".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(stream.local_addr().unwrap().ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_relay_bidirectional() {
        let (mut client_a, server_a) = duplex(1024);
        let (mut client_b, server_b) = duplex(1024);

        let relay_handle = tokio::spawn(async move { relay(server_a, server_b).await });

        client_a.write_all(b"message A->B").await.unwrap();
        let mut buf_b = vec![0u8; 12];
        client_b.read_exact(&mut buf_b).await.unwrap();
        assert_eq!(&buf_b, b"message A->B");

        client_b.write_all(b"message B->A").await.unwrap();
        let mut buf_a = vec![0u8; 12];
        client_a.read_exact(&mut buf_a).await.unwrap();
        assert_eq!(&buf_a, b"message B->A");

        drop(client_a);
        drop(client_b);
        tokio::time::timeout(Duration::from_millis(200), relay_handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_relay_ends_cleanly_on_eof() {
        let (client_a, server_a) = duplex(1024);
        let (client_b, server_b) = duplex(1024);

        let relay_handle = tokio::spawn(async move { relay(server_a, server_b).await });

        drop(client_a);
        drop(client_b);

        let result = tokio::time::timeout(Duration::from_millis(200), relay_handle)
            .await
            .expect("relay should end on EOF")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_relay_reports_read_error() {
        use std::pin::Pin;
        use std::task::{Context, Poll};
        use tokio::io::ReadBuf;

        /// Stream whose reads always fail; writes are swallowed
        struct FailingStream;

        impl tokio::io::AsyncRead for FailingStream {
            fn poll_read(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                _buf: &mut ReadBuf<'_>,
            ) -> Poll<std::io::Result<()>> {
                Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                )))
            }
        }

        impl tokio::io::AsyncWrite for FailingStream {
            fn poll_write(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                buf: &[u8],
            ) -> Poll<std::io::Result<usize>> {
                Poll::Ready(Ok(buf.len()))
            }

            fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
                Poll::Ready(Ok(()))
            }

            fn poll_shutdown(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
            ) -> Poll<std::io::Result<()>> {
                Poll::Ready(Ok(()))
            }
        }

        let (_client, server) = duplex(1024);
        let result = relay(FailingStream, server).await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_relay_large_transfer() {
        let (mut client_a, server_a) = duplex(65536);
        let (mut client_b, server_b) = duplex(65536);

        let relay_handle = tokio::spawn(async move { relay(server_a, server_b).await });

        let payload = vec![0xAB; 50_000];
        let writer = {
            let payload = payload.clone();
            tokio::spawn(async move {
                client_a.write_all(&payload).await.unwrap();
                client_a
            })
        };

        let mut received = vec![0u8; payload.len()];
        client_b.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);

        drop(writer.await.unwrap());
        drop(client_b);
        let _ = tokio::time::timeout(Duration::from_millis(200), relay_handle).await;
    }
}
