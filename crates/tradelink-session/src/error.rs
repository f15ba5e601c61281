//! Session error types.

use crate::store::StoreError;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backend call failed.
    #[error(transparent)]
    Api(#[from] tradelink_client::Error),

    /// Credential persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Refresh requested without a stored refresh token.
    #[error("No refresh token available")]
    MissingRefreshToken,
}
