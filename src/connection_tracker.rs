//! Connection Tracker
//!
//! Tracks which devices have recently delivered events. A device joins
//! the tracked set on its first successfully processed event and
//! leaves after a long idle timeout. Only membership changes touch the
//! published aggregate; a bare refresh just pushes the idle deadline.

use crate::hub::{ObjectDescriptor, Store};
use crate::name_resolver::DeviceNameResolver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Status state holding the aggregate of connected device names
pub const CONNECTION_STATE_ID: &str = "info.connection";

/// Per-device liveness tracking with idle expiry
pub struct ConnectionTracker {
    store: Arc<dyn Store>,
    resolver: Arc<DeviceNameResolver>,
    idle_timeout: Duration,
    /// Tracked set: device id -> running idle timer
    entries: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ConnectionTracker {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: Arc<DeviceNameResolver>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            idle_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a successfully processed event for a device
    pub async fn mark_alive(self: &Arc<Self>, device_id: &str) {
        let joined = {
            let mut entries = self.entries.lock().await;
            let timer = self.spawn_idle_timer(device_id);
            match entries.insert(device_id.to_string(), timer) {
                Some(previous) => {
                    previous.abort();
                    false
                }
                None => true,
            }
        };

        if joined {
            tracing::info!(device = %device_id, "Device connected");
            self.publish_aggregate().await;
        }
    }

    /// Devices currently considered connected
    pub async fn connected(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        devices.sort();
        devices
    }

    /// Cancel all idle timers
    pub async fn shutdown(&self) {
        let mut entries = self.entries.lock().await;
        for (_, timer) in entries.drain() {
            timer.abort();
        }
    }

    fn spawn_idle_timer(self: &Arc<Self>, device_id: &str) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        let device = device_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.idle_timeout).await;
            let left = tracker.entries.lock().await.remove(&device).is_some();
            if left {
                tracing::warn!(device = %device, "Device idle timeout, dropped from connected set");
                tracker.publish_aggregate().await;
            }
        })
    }

    /// Recompute the comma-joined name list; called on membership
    /// changes only
    async fn publish_aggregate(&self) {
        let devices = self.connected().await;
        let mut names = Vec::with_capacity(devices.len());
        for device in &devices {
            names.push(self.resolver.resolve(device).await);
        }
        let value = names.join(",");

        if let Err(e) = self
            .store
            .ensure_object(CONNECTION_STATE_ID, ObjectDescriptor::text_state("connection"))
            .await
        {
            tracing::warn!(error = %e, "Failed to ensure connection state object");
        }
        if let Err(e) = self
            .store
            .set_state_if_changed(CONNECTION_STATE_ID, value.into(), true)
            .await
        {
            tracing::warn!(error = %e, "Failed to publish connection aggregate");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::RecordingStore;
    use crate::hub::ForeignObject;

    const IDLE: Duration = Duration::from_secs(600);

    fn tracker(store: &Arc<RecordingStore>) -> Arc<ConnectionTracker> {
        let resolver = Arc::new(DeviceNameResolver::new(
            Arc::clone(store) as Arc<dyn Store>
        ));
        Arc::new(ConnectionTracker::new(
            Arc::clone(store) as Arc<dyn Store>,
            resolver,
            IDLE,
        ))
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_event_publishes_resolved_name() {
        let store = Arc::new(RecordingStore::with_foreign(vec![ForeignObject {
            id: "alias.0.AABB".to_string(),
            name: Some("Front Door".to_string()),
        }]));
        let tracker = tracker(&store);

        tracker.mark_alive("AABB").await;
        assert_eq!(
            store.text_writes(CONNECTION_STATE_ID),
            vec!["Front Door".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_does_not_republish() {
        let store = Arc::new(RecordingStore::new());
        let tracker = tracker(&store);

        tracker.mark_alive("AABB").await;
        tracker.mark_alive("AABB").await;
        tracker.mark_alive("AABB").await;
        assert_eq!(store.text_writes(CONNECTION_STATE_ID).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn join_of_second_device_extends_aggregate() {
        let store = Arc::new(RecordingStore::new());
        let tracker = tracker(&store);

        tracker.mark_alive("AABB").await;
        tracker.mark_alive("CCDD").await;
        assert_eq!(
            store.text_writes(CONNECTION_STATE_ID),
            vec!["AABB".to_string(), "AABB,CCDD".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_drops_device_and_republishes() {
        let store = Arc::new(RecordingStore::new());
        let tracker = tracker(&store);

        tracker.mark_alive("AABB").await;
        settle().await;
        tokio::time::advance(IDLE + Duration::from_secs(1)).await;
        settle().await;

        assert!(tracker.connected().await.is_empty());
        assert_eq!(
            store.text_writes(CONNECTION_STATE_ID),
            vec!["AABB".to_string(), String::new()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_pushes_idle_deadline_forward() {
        let store = Arc::new(RecordingStore::new());
        let tracker = tracker(&store);

        tracker.mark_alive("AABB").await;
        settle().await;
        tokio::time::advance(IDLE - Duration::from_secs(10)).await;
        settle().await;
        tracker.mark_alive("AABB").await;
        settle().await;

        tokio::time::advance(IDLE - Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(tracker.connected().await, vec!["AABB".to_string()]);

        tokio::time::advance(Duration::from_secs(11)).await;
        settle().await;
        assert!(tracker.connected().await.is_empty());
    }
}
