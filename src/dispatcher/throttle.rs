//! ThrottleGate - per-key send rate limiting
//!
//! A granted acquire opens a window for its key; while the window is
//! open every further acquire for that key is denied. Windows
//! self-expire through a spawned sweeper task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// The two relay channels subject to throttling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayChannelKind {
    Notification,
    Image,
}

impl RelayChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayChannelKind::Notification => "notification",
            RelayChannelKind::Image => "image",
        }
    }
}

/// Effective throttle key: channel type, optionally per device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ThrottleKey {
    channel: RelayChannelKind,
    device: Option<String>,
}

struct WindowEntry {
    expires_at: Instant,
    sweeper: JoinHandle<()>,
}

/// Per-key rate limiter
#[derive(Default)]
pub struct ThrottleGate {
    windows: Mutex<HashMap<ThrottleKey, WindowEntry>>,
}

impl ThrottleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant unless a window is open for the effective key; a grant
    /// opens a new window of `window` length
    pub async fn try_acquire(
        self: &Arc<Self>,
        channel: RelayChannelKind,
        device: Option<&str>,
        window: Duration,
    ) -> bool {
        if window.is_zero() {
            return true;
        }

        let key = ThrottleKey {
            channel,
            device: device.map(|d| d.to_string()),
        };

        let mut windows = self.windows.lock().await;
        if let Some(entry) = windows.get(&key) {
            if entry.expires_at > Instant::now() {
                return false;
            }
        }

        let gate = Arc::clone(self);
        let sweeper_key = key.clone();
        let sweeper = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut windows = gate.windows.lock().await;
            // Only reap a window that is actually over
            if let Some(entry) = windows.get(&sweeper_key) {
                if entry.expires_at <= Instant::now() {
                    windows.remove(&sweeper_key);
                }
            }
        });

        let entry = WindowEntry {
            expires_at: Instant::now() + window,
            sweeper,
        };
        if let Some(stale) = windows.insert(key, entry) {
            stale.sweeper.abort();
        }
        true
    }

    /// Cancel every sweeper and forget all open windows
    pub async fn shutdown(&self) {
        let mut windows = self.windows.lock().await;
        for (_, entry) in windows.drain() {
            entry.sweeper.abort();
        }
    }
}
