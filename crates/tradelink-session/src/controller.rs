//! Session controller.
//!
//! Owns the answer to "is the user logged in". Mediates login, signup,
//! refresh, and logout against the backend, is the sole writer of the
//! credential store, and keeps the presentation-facing [`SessionState`]
//! snapshot consistent with it. One controller is constructed per process
//! and handed around by reference.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use tradelink_client::{
    AuthResponse, LoginRequest, RefreshRequest, SESSION_EXPIRED_NOTICE, SignupRequest,
    TradelinkClient,
};
use tradelink_notify::{NotificationKind, Notifier};

use crate::error::{Result, SessionError};
use crate::monitor::{MonitorConfig, MonitorHandle, SessionMonitor};
use crate::store::{Credentials, SharedCredentialStore};

/// Authenticated subject as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub email: String,
}

/// Snapshot of the session the presentation layer renders from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user: Option<User>,
    /// True while startup or a login/signup attempt is in flight.
    pub loading: bool,
    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,
}

impl SessionState {
    fn initial() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            loading: true,
            last_error: None,
        }
    }

    fn signed_out() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            loading: false,
            last_error: None,
        }
    }

    fn authenticated(email: &str) -> Self {
        Self {
            is_authenticated: true,
            user: Some(User {
                email: email.to_owned(),
            }),
            loading: false,
            last_error: None,
        }
    }
}

/// The session state machine.
pub struct SessionController {
    store: SharedCredentialStore,
    client: TradelinkClient,
    notifier: Notifier,
    state: RwLock<SessionState>,
    monitor: Mutex<Option<MonitorHandle>>,
    monitor_config: MonitorConfig,
    /// Back-reference handed to the monitor's callbacks.
    weak_self: Weak<SessionController>,
}

impl SessionController {
    /// Create the controller and register its teardown with the gateway, so
    /// any 401 anywhere clears the session before the failing caller resumes.
    pub fn new(
        store: SharedCredentialStore,
        client: TradelinkClient,
        notifier: Notifier,
    ) -> Arc<Self> {
        Self::with_monitor_config(store, client, notifier, MonitorConfig::default())
    }

    /// Create the controller with a custom monitor configuration.
    pub fn with_monitor_config(
        store: SharedCredentialStore,
        client: TradelinkClient,
        notifier: Notifier,
        monitor_config: MonitorConfig,
    ) -> Arc<Self> {
        let controller = Arc::new_cyclic(|weak| Self {
            store,
            client,
            notifier,
            state: RwLock::new(SessionState::initial()),
            monitor: Mutex::new(None),
            monitor_config,
            weak_self: weak.clone(),
        });

        let weak = Arc::downgrade(&controller);
        controller.client.set_unauthorized_handler(move || {
            if let Some(controller) = weak.upgrade() {
                controller.handle_unauthorized();
            }
        });

        controller
    }

    /// Current session snapshot.
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// Restore a session from storage at process start.
    ///
    /// A complete stored credential set is trusted without a server round
    /// trip; the next request proves it invalid if it is. Must run inside the
    /// async runtime, since a restored session starts the monitor.
    pub fn initialize(&self) {
        match self.store.load() {
            Some(credentials) => {
                info!(email = %credentials.email, "restored stored session");
                *self.state.write() = SessionState::authenticated(&credentials.email);
                self.start_monitor();
            }
            None => {
                debug!("no stored credentials");
                self.state.write().loading = false;
            }
        }
    }

    /// Log in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.begin_attempt();
        let request = LoginRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let result = self.client.auth().login(&request).await;
        self.finish_sign_in(email, result, "Successfully logged in!")
    }

    /// Create an account with email and password.
    pub async fn signup(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.begin_attempt();
        let request = SignupRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let result = self.client.auth().signup(&request).await;
        self.finish_sign_in(email, result, "Account created successfully!")
    }

    /// Log out at the user's request.
    ///
    /// The server call is best-effort; local teardown happens regardless.
    pub async fn logout(&self) {
        if let Err(e) = self.client.auth().logout().await {
            warn!("logout request failed: {e}");
        }

        self.teardown();
        self.notifier
            .emit("You have been logged out", NotificationKind::Info, None);
        info!("signed out");
    }

    /// Automatic teardown, invoked by the gateway on any 401.
    ///
    /// Idempotent: tearing down an already-unauthenticated session is a
    /// no-op. Emits no notification — the gateway owns the user-facing
    /// session-expired notice, so it is never shown twice.
    pub fn handle_unauthorized(&self) {
        debug!("session invalidated");
        self.teardown();
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// On success only the token pair is replaced; the user identifier is
    /// untouched. On failure the session is torn down and the error
    /// re-raised.
    pub async fn refresh_token(&self) -> Result<AuthResponse> {
        let Some(refresh_token) = self.store.refresh_token() else {
            self.teardown();
            return Err(SessionError::MissingRefreshToken);
        };

        let request = RefreshRequest { refresh_token };
        match self.client.auth().refresh(&request).await {
            Ok(response) => {
                self.store
                    .update_tokens(&response.access_token, &response.refresh_token)?;
                self.state.write().last_error = None;
                debug!("token pair refreshed");
                Ok(response)
            }
            Err(e) => {
                self.teardown();
                Err(e.into())
            }
        }
    }

    /// Clear the recorded error, leaving the rest of the state alone. Used
    /// by the UI when the user starts correcting input.
    pub fn clear_error(&self) {
        self.state.write().last_error = None;
    }

    fn begin_attempt(&self) {
        let mut state = self.state.write();
        state.loading = true;
        state.last_error = None;
    }

    fn finish_sign_in(
        &self,
        email: &str,
        result: tradelink_client::Result<AuthResponse>,
        notice: &str,
    ) -> Result<AuthResponse> {
        match result {
            Ok(response) => {
                let credentials = Credentials {
                    access_token: response.access_token.clone(),
                    refresh_token: response.refresh_token.clone(),
                    email: email.to_owned(),
                };
                if let Err(e) = self.store.save(&credentials) {
                    self.record_failure(&e.to_string());
                    return Err(e.into());
                }

                // The broker choice was only needed to route the login form.
                self.store.clear_selected_broker();

                *self.state.write() = SessionState::authenticated(email);
                self.notifier.emit(notice, NotificationKind::Success, None);
                self.start_monitor();
                info!(email, "session established");
                Ok(response)
            }
            Err(e) => {
                self.record_failure(&e.to_string());
                Err(e.into())
            }
        }
    }

    fn record_failure(&self, message: &str) {
        let mut state = self.state.write();
        *state = SessionState {
            last_error: Some(message.to_owned()),
            ..SessionState::signed_out()
        };
    }

    fn teardown(&self) {
        self.store.clear();
        *self.state.write() = SessionState::signed_out();
        self.stop_monitor();
    }

    fn start_monitor(&self) {
        let weak = self.weak_self.clone();
        let monitor = SessionMonitor::new(
            self.store.clone(),
            self.notifier.clone(),
            self.monitor_config.clone(),
        )
        .on_expired(move || {
            // Natural expiry never produces a 401, so the session-expired
            // notice is emitted here instead of by the gateway.
            if let Some(controller) = weak.upgrade() {
                controller.teardown();
                controller.notifier.emit(
                    SESSION_EXPIRED_NOTICE,
                    NotificationKind::Warning,
                    None,
                );
            }
        })
        .on_expiring_soon(|minutes_left| {
            debug!(minutes_left, "access token expiring soon");
        });

        let mut guard = self.monitor.lock();
        if let Some(previous) = guard.take() {
            previous.stop();
        }
        *guard = Some(monitor.start());
    }

    fn stop_monitor(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;

    fn controller_without_backend() -> Arc<SessionController> {
        let store = Arc::new(MemoryCredentialStore::new());
        let client = TradelinkClient::builder().build().unwrap();
        SessionController::new(store, client, Notifier::default())
    }

    #[tokio::test]
    async fn test_starts_loading_and_unauthenticated() {
        let controller = controller_without_backend();
        let state = controller.state();

        assert!(!state.is_authenticated);
        assert!(state.loading);
        assert_eq!(state.user, None);
        assert_eq!(state.last_error, None);
    }

    #[tokio::test]
    async fn test_initialize_without_credentials() {
        let controller = controller_without_backend();
        controller.initialize();

        let state = controller.state();
        assert!(!state.is_authenticated);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let controller = controller_without_backend();
        controller.initialize();

        controller.handle_unauthorized();
        controller.handle_unauthorized();

        let state = controller.state();
        assert!(!state.is_authenticated);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_clear_error() {
        let controller = controller_without_backend();
        controller.record_failure("Invalid email or password");
        assert!(controller.state().last_error.is_some());

        controller.clear_error();
        assert_eq!(controller.state().last_error, None);
    }
}
