//! `ApiServer` builder and serve loop.
//!
//! Mounts a public `GET /health` next to the caller's routes, which all
//! sit behind [`require_signature`](crate::require_signature).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use forgeauth_session::{EthereumVerifier, SignatureVerifier};
use forgeauth_tick::{Clock, SystemClock};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

use crate::{protect, AuthConfig, ForgeAuthError, RequestAuthenticator};

/// Public health route plus `protected` behind the authenticator.
pub fn router(auth: RequestAuthenticator, protected: Router) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(protect(protected, auth))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Builder for configuring and starting an [`ApiServer`].
///
/// # Example
///
/// ```rust,ignore
/// let server = ApiServer::builder()
///     .bind("0.0.0.0:3001")
///     .auth_config(AuthConfig { app_name: "TokenForge".into(), ..Default::default() })
///     .build(routes)
///     .await?;
/// server.run().await
/// ```
pub struct ApiServerBuilder {
    bind_addr: String,
    auth_config: AuthConfig,
    verifier: Arc<dyn SignatureVerifier>,
    clock: Arc<dyn Clock>,
}

impl ApiServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            auth_config: AuthConfig::default(),
            verifier: Arc::new(EthereumVerifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn auth_config(mut self, config: AuthConfig) -> Self {
        self.auth_config = config;
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Binds the listener and assembles the router.
    ///
    /// # Errors
    /// [`ForgeAuthError::Io`] if the address cannot be bound.
    pub async fn build(self, protected: Router) -> Result<ApiServer, ForgeAuthError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        let auth = RequestAuthenticator::new(self.auth_config)
            .with_verifier(self.verifier)
            .with_clock(self.clock);

        Ok(ApiServer {
            listener,
            app: router(auth, protected),
        })
    }
}

impl Default for ApiServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound API server. Call [`run()`](Self::run) to start serving.
pub struct ApiServer {
    listener: TcpListener,
    app: Router,
}

impl ApiServer {
    pub fn builder() -> ApiServerBuilder {
        ApiServerBuilder::new()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the process ends.
    pub async fn run(self) -> Result<(), ForgeAuthError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "forgeauth API server listening");
        }
        axum::serve(self.listener, self.app).await?;
        Ok(())
    }
}
