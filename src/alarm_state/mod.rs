//! AlarmStateService - debounce state machine
//!
//! ## Responsibilities
//!
//! - Map events to boolean alarm indicators keyed by StateKey
//! - Keep at most one live auto-clear timer per key
//! - Ensure device/channel/state objects exist on first activation
//! - Force all pending indicators False on shutdown drain
//!
//! A burst of same-key events keeps the indicator True and pushes the
//! clear deadline forward; only a gap of at least the configured
//! duration produces the False transition. Per-key ordering is
//! guaranteed by a per-key mutex held across the whole transition plus
//! a generation counter checked by the timer callback, so a stale
//! timer can never clobber the write of a newer event.

use crate::decoder::Event;
use crate::error::Result;
use crate::hub::{ObjectDescriptor, Store};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Per-key slot: `timer` present = active-pending-clear, absent = clear
#[derive(Default)]
struct KeySlot {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Debounce state machine over the external store
pub struct AlarmStateService {
    store: Arc<dyn Store>,
    clear_after: Duration,
    /// Key table; the outer lock only guards slot lookup, every
    /// transition runs under the slot's own lock
    keys: Mutex<HashMap<String, Arc<Mutex<KeySlot>>>>,
}

impl AlarmStateService {
    /// Create a service clearing indicators `clear_after` after the
    /// last matching event
    pub fn new(store: Arc<dyn Store>, clear_after: Duration) -> Self {
        Self {
            store,
            clear_after,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Apply one event: set the indicator True and (re)start its clear
    /// timer
    pub async fn process(self: &Arc<Self>, event: &Event) -> Result<()> {
        let key = event.state_key();
        let slot = {
            let mut keys = self.keys.lock().await;
            keys.entry(key.clone()).or_default().clone()
        };

        let mut state = slot.lock().await;
        if let Some(timer) = state.timer.take() {
            // Refresh: the indicator is already up, only push the deadline
            timer.abort();
            self.store
                .set_state_if_changed(&key, true.into(), true)
                .await?;
            tracing::debug!(key = %key, "Alarm refreshed");
        } else {
            self.ensure_objects(event, &key).await?;
            self.store.set_state(&key, true.into(), true).await?;
            tracing::info!(key = %key, event_type = %event.event_type, "Alarm raised");
        }

        state.generation += 1;
        let generation = state.generation;
        let service = Arc::clone(self);
        let timer_key = key.clone();
        let timer_slot = Arc::clone(&slot);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(service.clear_after).await;
            service.clear(&timer_key, timer_slot, generation).await;
        }));

        Ok(())
    }

    /// Timer callback: write False unless a newer event superseded us
    async fn clear(&self, key: &str, slot: Arc<Mutex<KeySlot>>, generation: u64) {
        let mut state = slot.lock().await;
        if state.generation != generation {
            return;
        }
        state.timer = None;

        if let Err(e) = self.store.set_state(key, false.into(), true).await {
            tracing::warn!(key = %key, error = %e, "Failed to clear alarm state");
        } else {
            tracing::info!(key = %key, "Alarm cleared");
        }
    }

    /// Idempotently create the device/channel/state objects behind `key`
    async fn ensure_objects(&self, event: &Event, key: &str) -> Result<()> {
        let device_id = event.device_id();
        let native = json!({
            "mac": event.mac_address,
            "ip": event.ip_address,
            "serial": event.serial_number,
        });
        self.store
            .ensure_object(&device_id, ObjectDescriptor::device(device_id.as_str(), native))
            .await?;

        // Grouping level for the channel or detection target segment
        let mut parent = device_id;
        for segment in [&event.channel_name, &event.detection_target]
            .into_iter()
            .flatten()
        {
            parent = format!("{}.{}", parent, segment);
            self.store
                .ensure_object(&parent, ObjectDescriptor::channel(segment.as_str()))
                .await?;
        }

        self.store
            .ensure_object(key, ObjectDescriptor::indicator(event.event_type.as_str()))
            .await?;
        Ok(())
    }

    /// Number of keys currently pending a clear
    pub async fn pending(&self) -> usize {
        let keys = self.keys.lock().await;
        let mut count = 0;
        for slot in keys.values() {
            if slot.lock().await.timer.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Shutdown drain: cancel every pending timer and force the
    /// True→False write immediately
    pub async fn drain(&self) {
        let slots: Vec<(String, Arc<Mutex<KeySlot>>)> =
            self.keys.lock().await.drain().collect();

        for (key, slot) in slots {
            let mut state = slot.lock().await;
            if let Some(timer) = state.timer.take() {
                timer.abort();
                state.generation += 1;
                if let Err(e) = self.store.set_state(&key, false.into(), true).await {
                    tracing::warn!(key = %key, error = %e, "Failed to clear alarm on drain");
                }
            }
        }
        tracing::info!("Alarm timers drained");
    }
}
