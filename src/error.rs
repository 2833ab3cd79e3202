//! Unified error hierarchy for the fleet control plane.
//!
//! Each component gets its own error enum (mirrors the per-concern split
//! used elsewhere in this crate, e.g. `db::DbError`) rather than one flat
//! error type. Every variant exposes `error_code()` for metrics labeling.

use thiserror::Error;

/// Errors raised while resolving an authenticated request to a principal.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials presented")]
    Unauthenticated,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("oauth provider not configured: {0}")]
    UnknownProvider(String),
    #[error("oauth exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("oauth config invalid: {0}")]
    ConfigInvalid(String),
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidCredentials => "invalid_credentials",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::ExchangeFailed(_) => "exchange_failed",
            Self::ConfigInvalid(_) => "config_invalid",
        }
    }
}

/// Errors raised by the authorization gate.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("user is not authorized to access client {0}")]
    Unauthorized(String),
}

impl AuthzError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
        }
    }
}

/// Errors raised by tunnel lifecycle operations.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("failed to bind local listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("tunnel {0} not found")]
    NotFound(String),
    #[error("acl rejected remote address: {0}")]
    AclDenied(String),
}

impl TunnelError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Bind(_) => "bind_failed",
            Self::NotFound(_) => "not_found",
            Self::AclDenied(_) => "acl_denied",
        }
    }
}

/// Errors raised while binding or operating a client session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session for client {0} timed out waiting for supersession grace")]
    SupersedeTimeout(String),
    #[error("transport closed")]
    TransportClosed,
    #[error("command execution timed out")]
    Timeout,
    #[error("command execution canceled")]
    Canceled,
}

impl SessionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SupersedeTimeout(_) => "supersede_timeout",
            Self::TransportClosed => "transport_closed",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
        }
    }
}

/// Errors raised by `ClientStore` (C2).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage fault: {0}")]
    Storage(#[from] crate::db::DbError),
}

impl StoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage_fault",
        }
    }
}

/// Errors raised by `JobStore` (C5).
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("storage fault: {0}")]
    Storage(#[from] crate::db::DbError),
    #[error("invalid job filter: {0}")]
    InvalidFilter(String),
}

impl JobStoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage_fault",
            Self::InvalidFilter(_) => "invalid_filter",
        }
    }
}

/// Errors raised while dispatching a multi-client job (C6). Wraps the
/// component errors it composes over so `?` still works across the
/// store/job-store boundary without collapsing them into one flat enum.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Jobs(#[from] JobStoreError),
    #[error("multi-job {0} not found")]
    NotFound(String),
}

impl DispatchError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Jobs(e) => e.error_code(),
            Self::NotFound(_) => "not_found",
        }
    }
}
