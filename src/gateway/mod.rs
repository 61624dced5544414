//! Remote provider gateway boundary.
//!
//! The gateway performs the authenticated vendor call for one operation and
//! returns either a raw success payload or a classified failure. Request
//! construction, authentication, and retry policy live behind the trait;
//! this module owns only the failure classification and the token guard
//! that short-circuits calls after the provider rejects the access token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

/// Classified failures surfaced by a provider gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport-level failure (DNS, timeout, reset). Transient; safe to
    /// surface to the caller without top-level error reporting.
    #[error("network failure talking to the provider: {message}")]
    Network {
        /// Transport error detail.
        message: String,
    },

    /// Protocol-layer connection failure (e.g. resource not found).
    #[error("provider connection error: {message}")]
    Connection {
        /// Protocol error detail.
        message: String,
    },

    /// The provider rejected the access token.
    #[error("provider rejected the access token: {message}")]
    AuthInvalid {
        /// Rejection detail from the provider.
        message: String,
    },

    /// The provider requires its terms of service to be accepted first.
    #[error("provider terms of service must be accepted: {message}")]
    TermsOfServiceRequired {
        /// Gate detail from the provider.
        message: String,
    },

    /// Anything else; reported upward with full context.
    #[error("provider call failed: {message}")]
    Unclassified {
        /// Failure detail.
        message: String,
    },
}

/// Transport error markers that classify a failure as [`GatewayError::Network`].
const NETWORK_ERROR_MARKERS: [&str; 11] = [
    "ENOTFOUND",
    "ETIMEDOUT",
    "EAI_AGAIN",
    "ECONNRESET",
    "ECONNREFUSED",
    "EHOSTUNREACH",
    "ENETDOWN",
    "ENETUNREACH",
    "self signed certificate in certificate chain",
    "socket disconnected before secure",
    "socket hang up",
];

impl GatewayError {
    /// Classifies a raw provider failure message into an error class.
    #[must_use]
    pub fn classify(raw_message: impl Into<String>) -> Self {
        let message = raw_message.into();
        if NETWORK_ERROR_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            return Self::Network { message };
        }
        if message.contains("404") {
            return Self::Connection { message };
        }
        if message.contains("Bad credentials") || message.contains("FORBIDDEN") {
            return Self::AuthInvalid { message };
        }
        if message.contains("must accept the Terms of Service") {
            return Self::TermsOfServiceRequired { message };
        }
        Self::Unclassified { message }
    }

    /// Whether the failure is transient and safe to suppress from top-level
    /// error reporting.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns the class name, for logging and telemetry.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Connection { .. } => "connection",
            Self::AuthInvalid { .. } => "authInvalid",
            Self::TermsOfServiceRequired { .. } => "termsOfServiceRequired",
            Self::Unclassified { .. } => "unclassified",
        }
    }
}

/// The authenticated vendor-call boundary.
///
/// `operation` names the provider operation (e.g. `createComment`); `params`
/// carries its operation-specific parameters. The payload comes back raw;
/// the directive compiler gives it meaning.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Executes one provider operation.
    async fn call(&self, operation: &str, params: Value) -> Result<Value, GatewayError>;
}

/// Record of a token rejection held by [`GuardedGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenError {
    /// Rejection detail from the provider.
    pub message: String,
    /// When the rejection was observed.
    pub occurred_at: DateTime<Utc>,
}

/// Gateway wrapper that marks the provider token errored after an
/// [`GatewayError::AuthInvalid`] failure and short-circuits subsequent
/// calls without touching the network, until the token is reset.
#[derive(Debug)]
pub struct GuardedGateway<G> {
    inner: G,
    token_error: Mutex<Option<TokenError>>,
}

impl<G> GuardedGateway<G> {
    /// Wraps a gateway.
    #[must_use]
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            token_error: Mutex::new(None),
        }
    }

    /// Returns the recorded token rejection, when one exists.
    pub async fn token_error(&self) -> Option<TokenError> {
        self.token_error.lock().await.clone()
    }

    /// Clears the recorded token rejection (e.g. after re-authentication).
    pub async fn reset_token(&self) {
        *self.token_error.lock().await = None;
    }
}

#[async_trait]
impl<G: ProviderGateway> ProviderGateway for GuardedGateway<G> {
    async fn call(&self, operation: &str, params: Value) -> Result<Value, GatewayError> {
        if let Some(existing) = self.token_error.lock().await.as_ref() {
            return Err(GatewayError::AuthInvalid {
                message: existing.message.clone(),
            });
        }

        match self.inner.call(operation, params).await {
            Err(GatewayError::AuthInvalid { message }) => {
                warn!(%operation, "provider rejected the access token; short-circuiting further calls");
                *self.token_error.lock().await = Some(TokenError {
                    message: message.clone(),
                    occurred_at: Utc::now(),
                });
                Err(GatewayError::AuthInvalid { message })
            }
            other => other,
        }
    }
}
