//! Foreground (keepalive) declarations towards the host.
//!
//! A service that is asked to run continuously must declare so before it
//! registers for sensor events, and release the declaration when it stops.

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Notification channel used when none is configured.
pub const DEFAULT_NOTIFICATION_CHANNEL: &str = "step_counter";

/// Descriptor the host may show while the service runs in the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundNotification {
    pub channel_id: String,
    pub title: String,
    pub text: Option<String>,
}

impl ForegroundNotification {
    pub fn new(title: impl Into<String>, text: Option<String>) -> Self {
        Self {
            channel_id: DEFAULT_NOTIFICATION_CHANNEL.to_string(),
            title: title.into(),
            text,
        }
    }
}

/// Host mechanism that keeps a background component alive.
pub trait KeepaliveDeclarer: Send + Sync {
    /// Declare the obligation to keep running. The descriptor is optional.
    fn declare_foreground(&self, id: u32, descriptor: Option<&ForegroundNotification>);

    /// Release a previously declared obligation.
    fn release_foreground(&self, id: u32);
}

/// Keepalive declarer for hosts without a foreground mechanism.
///
/// Logs each declaration and remembers which obligation is active.
#[derive(Debug, Default)]
pub struct LogKeepalive {
    active: Mutex<Option<u32>>,
}

impl LogKeepalive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the currently declared obligation, if any.
    pub fn active_id(&self) -> Option<u32> {
        *self.active.lock()
    }
}

impl KeepaliveDeclarer for LogKeepalive {
    fn declare_foreground(&self, id: u32, descriptor: Option<&ForegroundNotification>) {
        match descriptor {
            Some(n) => info!(
                "Foreground declared (id={}, channel={}): {}{}",
                id,
                n.channel_id,
                n.title,
                n.text.as_deref().map(|t| format!(" - {}", t)).unwrap_or_default()
            ),
            None => warn!(
                "Foreground declared (id={}) without a notification descriptor",
                id
            ),
        }
        *self.active.lock() = Some(id);
    }

    fn release_foreground(&self, id: u32) {
        let mut active = self.active.lock();
        if *active == Some(id) {
            *active = None;
            info!("Foreground released (id={})", id);
        } else {
            warn!("Release of undeclared foreground id={}", id);
        }
    }
}
