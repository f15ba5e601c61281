//! Session expiration monitoring.
//!
//! A recurring watchdog over the stored access token. Each tick re-reads the
//! credential store, warns once when the token enters the near-expiry window,
//! and fires a terminal callback when it expires. Stopping is idempotent and
//! guarantees no further callback fires.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use tradelink_notify::{NotificationKind, Notifier};

use crate::store::SharedCredentialStore;
use crate::token;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default near-expiry warning threshold.
pub const DEFAULT_WARNING_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// How long the near-expiry warning toast stays up.
const WARNING_NOTICE_DURATION: Duration = Duration::from_secs(10);

/// Configuration for the session monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the stored token is re-evaluated.
    pub poll_interval: Duration,
    /// Warn when the token expires within this window.
    pub warning_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

/// Callback fired when the token is found expired (terminal).
pub type ExpiredCallback = Box<dyn Fn() + Send + Sync>;

/// Callback fired once per warning window with the minutes left.
pub type ExpiringSoonCallback = Box<dyn Fn(u64) + Send + Sync>;

/// Per-monitor warning state, reset whenever the token leaves the warning
/// window (a refresh pushed expiry back out).
#[derive(Debug, Default)]
pub struct ExpirationWatch {
    warning_shown: bool,
}

/// What a single evaluation decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Token absent or past expiry; the monitor must stop.
    Expired,
    /// Token entered the warning window; warn exactly once.
    Warn { minutes_left: u64 },
    /// Nothing to do.
    Idle,
}

impl ExpirationWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one tick against the current token.
    pub fn evaluate(
        &mut self,
        access_token: Option<&str>,
        now: i64,
        warning_threshold: Duration,
    ) -> TickAction {
        let Some(access_token) = access_token else {
            return TickAction::Expired;
        };

        if token::is_expired_at(access_token, now) {
            return TickAction::Expired;
        }

        if token::is_expiring_soon_at(access_token, now, warning_threshold) {
            if self.warning_shown {
                return TickAction::Idle;
            }
            self.warning_shown = true;
            let remaining = token::seconds_until_expiry_at(access_token, now);
            TickAction::Warn {
                minutes_left: (remaining as u64).div_ceil(60),
            }
        } else {
            self.warning_shown = false;
            TickAction::Idle
        }
    }
}

/// Recurring watchdog over the stored access token.
pub struct SessionMonitor {
    store: SharedCredentialStore,
    notifier: Notifier,
    config: MonitorConfig,
    on_expired: Option<ExpiredCallback>,
    on_expiring_soon: Option<ExpiringSoonCallback>,
}

impl SessionMonitor {
    /// Create a monitor over the given store.
    pub fn new(store: SharedCredentialStore, notifier: Notifier, config: MonitorConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            on_expired: None,
            on_expiring_soon: None,
        }
    }

    /// Set the terminal expiry callback.
    pub fn on_expired(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_expired = Some(Box::new(callback));
        self
    }

    /// Set the near-expiry callback.
    pub fn on_expiring_soon(mut self, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_expiring_soon = Some(Box::new(callback));
        self
    }

    /// Spawn the polling task and return its stop handle.
    pub fn start(self) -> MonitorHandle {
        let SessionMonitor {
            store,
            notifier,
            config,
            on_expired,
            on_expiring_soon,
        } = self;

        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = time::interval(config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // An interval's first tick completes immediately; consume it so
            // the first evaluation happens one full period after start.
            interval.tick().await;

            let mut watch_state = ExpirationWatch::new();
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        debug!("session monitor stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let access_token = store.access_token();
                        let now = Utc::now().timestamp();
                        match watch_state.evaluate(access_token.as_deref(), now, config.warning_threshold) {
                            TickAction::Expired => {
                                info!("access token expired, stopping session monitor");
                                if let Some(callback) = &on_expired {
                                    callback();
                                }
                                break;
                            }
                            TickAction::Warn { minutes_left } => {
                                debug!(minutes_left, "access token expiring soon");
                                if let Some(callback) = &on_expiring_soon {
                                    callback(minutes_left);
                                }
                                let plural = if minutes_left == 1 { "" } else { "s" };
                                notifier.emit(
                                    format!(
                                        "Your session will expire in {minutes_left} minute{plural}. Please save your work."
                                    ),
                                    NotificationKind::Warning,
                                    Some(WARNING_NOTICE_DURATION),
                                );
                            }
                            TickAction::Idle => {}
                        }
                    }
                }
            }
        });

        MonitorHandle { stop_tx, task }
    }
}

/// Handle to a running session monitor.
///
/// Dropping the handle also stops the monitor.
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the monitor to stop. Idempotent; no callback fires after the
    /// signal is observed.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Check if the monitor task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
