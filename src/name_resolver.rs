//! DeviceNameResolver - cached display-name lookup
//!
//! Names come from a registry query over the external store, matched
//! by device id. The cache is filled once per device and never
//! invalidated for the process lifetime.

use crate::hub::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cached device-id to display-name resolver
pub struct DeviceNameResolver {
    store: Arc<dyn Store>,
    cache: RwLock<HashMap<String, String>>,
}

impl DeviceNameResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Display name for a device, falling back to the raw id
    pub async fn resolve(&self, device_id: &str) -> String {
        if let Some(name) = self.cache.read().await.get(device_id) {
            return name.clone();
        }

        let pattern = format!("*{}*", device_id);
        let name = match self.store.query_foreign_objects(&pattern, "device").await {
            Ok(objects) => objects
                .into_iter()
                .find_map(|o| o.name)
                .unwrap_or_else(|| device_id.to_string()),
            Err(e) => {
                tracing::warn!(device = %device_id, error = %e, "Name lookup failed");
                device_id.to_string()
            }
        };

        self.cache
            .write()
            .await
            .insert(device_id.to_string(), name.clone());
        name
    }
}
