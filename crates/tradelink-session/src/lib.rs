//! Session lifecycle for the tradelink client.
//!
//! Keeps client-held credentials consistent with backend session state:
//!
//! - [`store`] — persistent credential storage (token pair + user identifier)
//! - [`token`] — unverified token payload inspection (expiry math)
//! - [`monitor`] — recurring expiry watchdog with near-expiry warnings
//! - [`controller`] — the state machine that owns "is the user logged in"
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tradelink_client::TradelinkClient;
//! use tradelink_notify::Notifier;
//! use tradelink_session::{FileCredentialStore, SessionController, default_data_dir};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileCredentialStore::new(&default_data_dir()));
//! let notifier = Notifier::default();
//!
//! let client = TradelinkClient::builder()
//!     .base_url("http://localhost:8080")
//!     .token_source(store.clone())
//!     .notifier(notifier.clone())
//!     .build()?;
//!
//! let session = SessionController::new(store, client.clone(), notifier);
//! session.initialize();
//!
//! if !session.state().is_authenticated {
//!     session.login("user@example.com", "secret").await?;
//! }
//!
//! let holdings = client.trading().holdings().await?;
//! println!("{} holdings", holdings.holdings.len());
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod monitor;
pub mod store;
pub mod token;

pub use controller::{SessionController, SessionState, User};
pub use error::{Result, SessionError};
pub use monitor::{ExpirationWatch, MonitorConfig, MonitorHandle, SessionMonitor, TickAction};
pub use store::{
    CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore,
    SharedCredentialStore, StoreError, default_data_dir,
};
pub use token::{TokenClaims, TokenError};
