//! Listener and component wiring
//!
//! [`Server::bootstrap`] assembles the runtime from a [`Config`]: allow-list,
//! RADIUS client, auth cache (with its sweeper), access logger, accounting
//! pipeline (with its hourly scheduler), and the TCP listener. [`Server::run`]
//! accepts connections until shutdown; every connection runs as its own task
//! whose errors stay in its log line. Accept failures are fatal.

use crate::accesslog::AccessLogger;
use crate::accounting::{AccountingPipeline, DEFAULT_MAX_BACKUPS};
use crate::acl::Acl;
use crate::auth::{spawn_sweeper, AuthCache, Validator};
use crate::config::Config;
use crate::radius::{AccessRequester, AccountingSink, RadiusClient};
use crate::scheduler::run_hourly;
use crate::socks::{serve_conn, ProxyContext};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// The assembled SOCKS5 server
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ProxyContext>,
}

impl Server {
    /// Build every component from the configuration and bind the listener.
    ///
    /// Background tasks (cache sweeper, hourly accounting) subscribe to the
    /// given shutdown channel. Any failure here is a bootstrap failure; the
    /// process should exit non-zero.
    pub async fn bootstrap(config: &Config, shutdown: &broadcast::Sender<bool>) -> Result<Server> {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", config.log_dir.display())
        })?;

        let acl = Acl::from_list(&config.acl).with_context(|| "Failed to parse GANTED_ACL")?;
        if acl.is_empty() {
            warn!("Empty ACL: all destinations will be denied");
        } else {
            info!("ACL permits {}", acl);
        }

        let radius = Arc::new(RadiusClient::new(
            config.radius_server,
            config.radius_accounting_server,
            &config.radius_secret,
            &config.nas_identifier,
        ));

        let validator = if config.has_credentials() {
            let cache = Arc::new(AuthCache::new(config.auth_cache_retention));
            spawn_sweeper(
                Arc::clone(&cache),
                config.auth_cache_gc,
                shutdown.subscribe(),
            );
            Some(Arc::new(Validator::new(
                cache,
                Arc::clone(&radius) as Arc<dyn AccessRequester>,
            )))
        } else {
            warn!("No RADIUS secret configured, running without authentication");
            None
        };

        let access_log = Arc::new(
            AccessLogger::open(config.log_dir.join("access.log"))
                .with_context(|| "Failed to open access log")?,
        );

        let pipeline = Arc::new(AccountingPipeline::new(
            Arc::clone(&access_log),
            Arc::clone(&radius) as Arc<dyn AccountingSink>,
            config.log_dir.clone(),
            DEFAULT_MAX_BACKUPS,
        ));
        tokio::spawn(run_hourly(pipeline, shutdown.subscribe()));

        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("Failed to bind {}", config.listen))?;
        info!("SOCKS5 server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            ctx: Arc::new(ProxyContext {
                validator,
                acl,
                bind_output: config.bind_output,
                access_log,
            }),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown signal arrives.
    ///
    /// An accept error aborts the server; per-connection errors are logged
    /// by the spawned task and never reach this loop.
    pub async fn run(self, mut shutdown: broadcast::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.with_context(|| "Accept failed")?;
                    debug!("Accepted connection from {}", peer);
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = serve_conn(stream, peer, ctx).await {
                            warn!("Session from {} ended with error: {:#}", peer, e);
                        }
                    });
                }
                _ = shutdown.recv() => {
                    info!("Listener shutting down");
                    return Ok(());
                }
            }
        }
    }
}
