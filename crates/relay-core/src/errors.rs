use crate::{admission::DenyReason, model::types::ApiError};

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the relay can
/// decide consistently between silence, a user-facing message and a generic
/// apology.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("rate limited: {0}")]
    RateLimited(DenyReason),

    #[error("completion api error: {0}")]
    Api(#[from] ApiError),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
