//! Error types for the platform seams, the collaborator client and the
//! subscription lifecycle.
//!
//! Everything downstream of an arrived push degrades instead of failing, so
//! only the subscription path surfaces these to callers.

use thiserror::Error;

use crate::platform::Permission;

/// Failure reported by a browser platform capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The capability does not exist in this execution context.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The capability exists but the call failed.
    #[error("failed: {0}")]
    Failed(String),
}

/// Failure talking to the collaborator HTTP endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Endpoint that was called.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The collaborator answered with a non-2xx status.
    #[error("HTTP {status}: {text}")]
    Status {
        /// Numeric status code.
        status: u16,
        /// Status reason or (truncated) response body.
        text: String,
    },
    /// The response body was not the expected JSON.
    #[error("failed to decode response from {url}: {reason}")]
    Decode {
        /// Endpoint that was called.
        url: String,
        /// Decoder message.
        reason: String,
    },
    /// The configured base URL cannot be used.
    #[error("invalid collaborator URL: {0}")]
    InvalidUrl(String),
}

/// Terminal failure of one subscription lifecycle attempt.
///
/// The caller decides whether to run the whole lifecycle again.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The user or platform did not grant notification permission.
    #[error("permission denied ({0})")]
    PermissionDenied(Permission),
    /// Fetching the collaborator's public key failed.
    #[error("failed to fetch public key: {0}")]
    KeyFetch(#[source] ApiError),
    /// The public key is not valid base64url.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    /// The platform refused to create a push subscription.
    #[error("platform subscribe failed: {0}")]
    PlatformSubscribe(#[source] PlatformError),
    /// The collaborator rejected or never received the registration.
    #[error("registration failed: {0}")]
    Registration(#[source] ApiError),
}
