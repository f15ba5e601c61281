//! Authentication API.
//!
//! Wraps the `/auth/*` endpoints and maps rejection statuses onto messages
//! suitable for direct display in a login or signup form.

use crate::client::TradelinkClient;
use crate::error::{Error, Result};
use crate::types::{AuthResponse, LoginRequest, RefreshRequest, SignupRequest};

/// Authentication API client.
pub struct AuthApi {
    client: TradelinkClient,
}

impl AuthApi {
    pub(crate) fn new(client: TradelinkClient) -> Self {
        Self { client }
    }

    /// Exchange email and password for a token pair.
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        self.client
            .post("auth/login", request)
            .await
            .map_err(|e| match e {
                Error::Api { status: 400, .. } => Error::Auth("Invalid email or password".into()),
                Error::Api { status: 500, .. } => {
                    Error::Auth("Server error. Please try again later.".into())
                }
                Error::Api { message, .. } => Error::Auth(message),
                other => other,
            })
    }

    /// Create an account and receive a token pair.
    pub async fn signup(&self, request: &SignupRequest) -> Result<AuthResponse> {
        self.client
            .post("auth/signup", request)
            .await
            .map_err(|e| match e {
                Error::Api { status: 400, .. } => {
                    Error::Auth("User already exists or invalid data".into())
                }
                Error::Api { status: 500, .. } => {
                    Error::Auth("Server error. Please try again later.".into())
                }
                Error::Api { message, .. } => Error::Auth(message),
                other => other,
            })
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// Any server rejection means the session is no longer recoverable, so
    /// the message is uniform. Transport failures (timeout, network) pass
    /// through untouched.
    pub async fn refresh(&self, request: &RefreshRequest) -> Result<AuthResponse> {
        self.client
            .post("auth/refresh", request)
            .await
            .map_err(|e| match e {
                Error::Api { .. } => Error::Auth("Session expired. Please login again.".into()),
                other => other,
            })
    }

    /// Invalidate the session server-side. Best-effort; callers are expected
    /// to proceed with local teardown even if this fails.
    pub async fn logout(&self) -> Result<()> {
        self.client.post_empty("auth/logout").await
    }
}
