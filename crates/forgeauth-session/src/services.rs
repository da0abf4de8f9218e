//! Ports to the services a session depends on.
//!
//! forgeauth does not issue tokens or draw toasts. It calls out to a
//! [`TokenService`] and a [`Notifier`] that the application provides.

use std::future::Future;

use forgeauth_protocol::UserId;

use crate::TokenError;

/// The backend that issues and refreshes session tokens.
///
/// # Example
///
/// ```rust
/// use forgeauth_protocol::UserId;
/// use forgeauth_session::{TokenError, TokenService};
///
/// /// Hands out a fixed token and never expires. Development only.
/// struct StaticTokens;
///
/// impl TokenService for StaticTokens {
///     async fn initialize(&self, _user: &UserId) -> Result<(), TokenError> {
///         Ok(())
///     }
///     async fn refresh_token(&self) -> Result<(), TokenError> {
///         Ok(())
///     }
///     async fn get_token(&self) -> Result<Option<String>, TokenError> {
///         Ok(Some("dev".into()))
///     }
///     fn is_token_expired(&self) -> bool {
///         false
///     }
///     async fn cleanup(&self) -> Result<(), TokenError> {
///         Ok(())
///     }
/// }
/// ```
pub trait TokenService: Send + Sync + 'static {
    /// Starts issuing tokens for `user`.
    fn initialize(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<(), TokenError>> + Send;

    fn refresh_token(&self) -> impl Future<Output = Result<(), TokenError>> + Send;

    /// The current token, or `None` if there is none.
    fn get_token(
        &self,
    ) -> impl Future<Output = Result<Option<String>, TokenError>> + Send;

    fn is_token_expired(&self) -> bool;

    /// Forgets the current token. Called on every session end.
    fn cleanup(&self) -> impl Future<Output = Result<(), TokenError>> + Send;
}

/// User-facing notifications (toasts, banners).
pub trait Notifier: Send + Sync + 'static {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warning(&self, message: &str);
    fn info(&self, message: &str);
}

/// A [`Notifier`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!(kind = "success", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(kind = "error", "{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!(kind = "warning", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(kind = "info", "{message}");
    }
}
