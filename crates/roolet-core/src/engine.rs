use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::client::RpcClient;
use crate::config::Configuration;
use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::enums::GroupConnection;
use crate::error::RooletError;
use crate::registry::MethodRegistry;
use crate::session::Session;
use crate::token::TokenMaker;
use crate::worker::WorkerPool;

/// Composition root owning `Configuration`, the shared `MethodRegistry`,
/// `Connection`, `WorkerPool`, and `Dispatcher` for one process's lifetime
/// (`spec.md` §4.11). Application code constructs exactly one `Engine`.
pub struct Engine {
    config: Configuration,
    registry: Arc<MethodRegistry>,
    active: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: Configuration, registry: MethodRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The shared shutdown flag; cloning it lets a caller trigger shutdown
    /// without waiting on OS signals (tests, embedding in another service).
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        self.active.clone()
    }

    fn token_maker(&self) -> Result<TokenMaker, RooletError> {
        let path = self
            .config
            .crypto_priv_key_path
            .as_deref()
            .ok_or_else(|| RooletError::KeyRead {
                path: std::path::PathBuf::new(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "crypto_priv_key_path is not configured",
                ),
            })?;
        TokenMaker::new(&self.config.crypto_algorithm, path)
    }

    /// Installs SIGINT/SIGTERM handlers that flip the shared `active` flag
    /// (`spec.md` §5). Spawned as a background task; the engine's own loops
    /// poll the flag cooperatively.
    fn install_signal_handlers(&self) {
        let active = self.active.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut terminate =
                    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    {
                        Ok(signal) => signal,
                        Err(err) => {
                            warn!(%err, "failed to install SIGTERM handler");
                            let _ = ctrl_c.await;
                            active.store(false, Ordering::SeqCst);
                            return;
                        }
                    };
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            info!("shutdown signal received");
            active.store(false, Ordering::SeqCst);
        });
    }

    /// Runs as a service worker: handshakes as `GroupConnection::Server`,
    /// spawns the worker pool, and drives the Dispatcher until a graceful
    /// shutdown completes. Reconnects on recoverable connection loss per
    /// `config.reconnect_delay` (`spec.md` §4.4, §7 tier 2).
    pub async fn run(&self) -> Result<(), RooletError> {
        if self.registry.is_empty() {
            return Err(RooletError::EmptyRegistry);
        }
        if self.config.workers == 0 || self.config.workers > 1024 {
            return Err(RooletError::InvalidWorkerCount(self.config.workers));
        }

        self.install_signal_handlers();

        let mut session = Session::new();
        let mut token: Option<String> = None;
        loop {
            let mut connection = Connection::connect_with_retry(&self.config, &self.active).await?;

            // Reuse the last issued token across a reconnect (`spec.md` §4.4);
            // only mint a fresh one the first time through, or after the
            // broker has explicitly rejected the previous one.
            let auth_token = match (session.token_reusable(), &token) {
                (true, Some(existing)) => existing.clone(),
                _ => {
                    let fresh = self.token_maker()?.make_token()?;
                    token = Some(fresh.clone());
                    fresh
                }
            };
            let metadata = json!({ "methods": self.registry.names() });
            match connection
                .handshake(
                    &mut session,
                    &auth_token,
                    &self.config.crypto_pub_key_name,
                    GroupConnection::Server,
                    metadata,
                )
                .await
            {
                Ok(()) => {}
                Err(RooletError::AuthRefused) => {
                    warn!("broker refused the auth token, minting a fresh one");
                    session.invalidate_token();
                    token = None;
                    if !self.config.reconnect_enabled() || !self.active.load(Ordering::SeqCst) {
                        return Err(RooletError::AuthRefused);
                    }
                    tokio::time::sleep(std::time::Duration::from_secs_f64(
                        self.config.reconnect_delay,
                    ))
                    .await;
                    continue;
                }
                Err(err) => return Err(err),
            }
            info!(cid = ?session.cid(), "service worker active");

            let pool = WorkerPool::spawn(self.registry.clone(), self.config.workers)?;
            let dispatcher = Dispatcher::new(connection, pool, self.active.clone(), self.config.iter);

            match dispatcher.run().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if !self.active.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    warn!(%err, "connection lost, reconnecting");
                    session.enter_reconnecting();
                    if !self.config.reconnect_enabled() {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_secs_f64(
                        self.config.reconnect_delay,
                    ))
                    .await;
                }
            }
        }
    }

    /// Connects and handshakes as `GroupConnection::Client`, returning an
    /// [`RpcClient`] ready for [`RpcClient::call`]. No worker pool is
    /// spawned on this path.
    pub async fn client(&self) -> Result<RpcClient, RooletError> {
        let mut connection = Connection::connect_with_retry(&self.config, &self.active).await?;
        let mut session = Session::new();

        // No reconnect loop here, so there is no prior token to reuse: each
        // call builds one fresh Session and one fresh token.
        let token_maker = self.token_maker()?;
        let token = token_maker.make_token()?;
        connection
            .handshake(
                &mut session,
                &token,
                &self.config.crypto_pub_key_name,
                GroupConnection::Client,
                json!({}),
            )
            .await?;
        info!(cid = ?session.cid(), "rpc client active");

        Ok(RpcClient::new(connection, session))
    }
}
