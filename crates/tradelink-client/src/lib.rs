//! HTTP client SDK for the tradelink multi-broker trading platform.
//!
//! This crate provides the HTTP gateway every other layer talks through: it
//! attaches the current bearer token to outgoing requests, enforces
//! per-request timeouts, classifies failures into a small error taxonomy,
//! and runs the unauthorized-teardown protocol whenever the backend answers
//! 401 — before the error ever reaches the caller.
//!
//! # Example
//!
//! ```no_run
//! use tradelink_client::{LoginRequest, TradelinkClient};
//!
//! # async fn example() -> tradelink_client::Result<()> {
//! let client = TradelinkClient::builder()
//!     .base_url("http://localhost:8080")
//!     .build()?;
//!
//! let tokens = client
//!     .auth()
//!     .login(&LoginRequest {
//!         email: "user@example.com".into(),
//!         password: "secret".into(),
//!     })
//!     .await?;
//! println!("access token expires in {}s", tokens.expires_in);
//!
//! let holdings = client.trading().holdings().await?;
//! println!("{} holdings", holdings.holdings.len());
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **Auth**: login, signup, token refresh, logout
//! - **Trading**: holdings, orderbook, positions, order placement
//! - **Health**: backend health checks

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use client::{
    ClientBuilder, DEFAULT_BASE_URL, RequestOptions, RetryPolicy, SESSION_EXPIRED_NOTICE,
    TokenSource, TradelinkClient, UnauthorizedHandler,
};
pub use error::{Error, Result};
pub use types::*;
