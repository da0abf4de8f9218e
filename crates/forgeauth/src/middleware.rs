//! Wallet-signature authentication for HTTP requests.
//!
//! Every protected request carries
//! `Authorization: Bearer <address>:<signature>:<timestamp_ms>`, where
//! `signature` is an EIP-191 signature over
//! [`canonical_message`](forgeauth_session::canonical_message). Nothing is
//! stored server-side: freshness comes from the timestamp, identity from
//! signature recovery.
//!
//! ```text
//! request ─→ header? ─→ Bearer? ─→ 3 fields? ─→ fresh? ─→ signed? ─→ next
//!              │          │           │           │          │
//!              └──────────┴───────────┴───────────┴──────────┴─→ 401
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use forgeauth_protocol::{Address, AuthCredential};
use forgeauth_session::{canonical_message, EthereumVerifier, SignatureVerifier};
use forgeauth_tick::{Clock, SystemClock};
use serde::Serialize;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Prefix of the signed message, e.g. `"TokenForge API Authentication"`.
    pub app_name: String,
    /// Maximum distance between the credential timestamp and now.
    pub replay_window: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_name: "TokenForge".to_string(),
            replay_window: Duration::from_secs(5 * 60),
        }
    }
}

impl AuthConfig {
    pub const MIN_REPLAY_WINDOW: Duration = Duration::from_secs(1);
    pub const MAX_REPLAY_WINDOW: Duration = Duration::from_secs(60 * 60);

    /// Clamps `replay_window` to `[1 s, 1 h]`.
    pub fn validated(mut self) -> Self {
        let clamped = self
            .replay_window
            .clamp(Self::MIN_REPLAY_WINDOW, Self::MAX_REPLAY_WINDOW);
        if clamped != self.replay_window {
            warn!(
                replay_window_ms = self.replay_window.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "replay window out of range, clamping"
            );
            self.replay_window = clamped;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// The identity proven by a request's credential.
///
/// Inserted into the request extensions; read it with
/// `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    /// Lowercase.
    pub address: Address,
    pub timestamp: u64,
}

/// Why a request was turned away. Always a 401.
///
/// The `Display` text is the `error` field of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("No authorization header")]
    MissingHeader,
    #[error("Invalid authorization format")]
    InvalidFormat,
    #[error("Missing authentication parameters")]
    MissingParameters,
    #[error("Signature expired")]
    Expired,
    #[error("Invalid signature")]
    InvalidSignature,
    /// Anything unexpected, such as a verifier that errored.
    #[error("Authentication failed")]
    Failed,
}

#[derive(Serialize)]
struct RejectionBody {
    success: bool,
    error: String,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = RejectionBody {
            success: false,
            error: self.to_string(),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// RequestAuthenticator
// ---------------------------------------------------------------------------

/// Checks credentials. Stateless apart from its configuration, so one
/// instance serves every request.
#[derive(Clone)]
pub struct RequestAuthenticator {
    config: Arc<AuthConfig>,
    verifier: Arc<dyn SignatureVerifier>,
    clock: Arc<dyn Clock>,
}

impl RequestAuthenticator {
    /// An authenticator using [`EthereumVerifier`] and the system clock.
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config.validated()),
            verifier: Arc::new(EthereumVerifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticates from request headers.
    pub fn authenticate_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedUser, AuthRejection> {
        let value = match headers.get(header::AUTHORIZATION) {
            None => None,
            Some(value) => Some(value.to_str().map_err(|_| AuthRejection::InvalidFormat)?),
        };
        self.authenticate(value)
    }

    /// Authenticates the raw `Authorization` header value.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<AuthenticatedUser, AuthRejection> {
        let authorization = authorization.ok_or(AuthRejection::MissingHeader)?;
        let token = authorization
            .strip_prefix("Bearer ")
            .ok_or(AuthRejection::InvalidFormat)?;
        let credential: AuthCredential = token.trim().parse().map_err(|e| {
            debug!(error = %e, "malformed credential");
            AuthRejection::MissingParameters
        })?;

        let now = self.clock.now_millis();
        let skew = now.abs_diff(credential.timestamp);
        if skew > self.config.replay_window.as_millis() as u64 {
            return Err(AuthRejection::Expired);
        }

        let Ok(address) = Address::parse(&credential.address) else {
            return Err(AuthRejection::InvalidSignature);
        };
        let message = canonical_message(&self.config.app_name, credential.timestamp);
        match self
            .verifier
            .verify(&message, &credential.signature, address.as_str())
        {
            Ok(true) => Ok(AuthenticatedUser {
                address,
                timestamp: credential.timestamp,
            }),
            Ok(false) => Err(AuthRejection::InvalidSignature),
            Err(e) => {
                warn!(error = %e, "signature verifier failed");
                Err(AuthRejection::Failed)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// axum glue
// ---------------------------------------------------------------------------

/// Middleware for [`axum::middleware::from_fn_with_state`].
///
/// On success the request continues with an [`AuthenticatedUser`]
/// extension. On failure it is answered with 401 and never reaches the
/// handler.
pub async fn require_signature(
    State(auth): State<RequestAuthenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth.authenticate_headers(request.headers()) {
        Ok(user) => {
            debug!(address = %user.address, path = %request.uri().path(), "request authenticated");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(rejection) => {
            warn!(reason = %rejection, path = %request.uri().path(), "request rejected");
            rejection.into_response()
        }
    }
}

/// Puts every route of `router` behind [`require_signature`].
pub fn protect<S>(router: Router<S>, auth: RequestAuthenticator) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(auth, require_signature))
}
