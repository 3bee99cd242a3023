//! `AuthorityServer` builder and accept loop.
//!
//! Hosts any [`Authority`] over WebSocket so presenter screens and subject
//! devices can share one. Each connection gets its own task; the
//! authority itself serializes whatever needs serializing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rollcall_authority::Authority;
use rollcall_protocol::{Codec, JsonCodec};
use rollcall_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{RollcallError, ServerConfig};

/// Shared state handed to each connection task.
pub(crate) struct ServerState<A, C> {
    pub(crate) authority: Arc<A>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for an [`AuthorityServer`].
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use rollcall::prelude::*;
///
/// # async fn demo() -> Result<(), RollcallError> {
/// let authority = Arc::new(InMemoryAuthority::new(AdjudicationPolicy::default()));
/// let server = AuthorityServer::builder()
///     .bind("0.0.0.0:9400")
///     .build(authority)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct AuthorityServerBuilder {
    config: ServerConfig,
}

impl AuthorityServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Takes bind address and idle timeout from a config section.
    pub fn config(mut self, config: &ServerConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_secs = timeout.as_secs();
        self
    }

    /// Binds the listener. Frames are JSON.
    pub async fn build<A: Authority>(
        self,
        authority: Arc<A>,
    ) -> Result<AuthorityServer<A, JsonCodec>, RollcallError> {
        let config = self.config.validated();
        let transport = WebSocketTransport::bind(&config.bind).await?;

        let state = Arc::new(ServerState {
            authority,
            codec: JsonCodec,
            idle_timeout: config.idle_timeout(),
        });

        Ok(AuthorityServer { transport, state })
    }
}

impl Default for AuthorityServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound authority server. Call [`run`](Self::run) to start serving.
pub struct AuthorityServer<A, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl AuthorityServer<(), JsonCodec> {
    pub fn builder() -> AuthorityServerBuilder {
        AuthorityServerBuilder::new()
    }
}

impl<A, C> AuthorityServer<A, C>
where
    A: Authority,
    C: Codec,
{
    /// The address the server is bound to. Useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, RollcallError> {
        Ok(self.transport.local_addr()?)
    }

    /// Accepts connections until the process ends, one task per
    /// connection.
    pub async fn run(mut self) -> Result<(), RollcallError> {
        tracing::info!(
            addr = ?self.transport.local_addr().ok(),
            "authority server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
