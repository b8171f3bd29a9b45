//! MemoryStore - standalone Store implementation
//!
//! Keeps the object/state tables in memory and persists artifacts to a
//! data directory. Used when alarmhub runs without an external host.

use super::{ForeignObject, ObjectDescriptor, StateValue, Store};
use crate::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;

/// In-memory store with on-disk artifact persistence
pub struct MemoryStore {
    objects: RwLock<HashMap<String, ObjectDescriptor>>,
    states: RwLock<HashMap<String, StateValue>>,
    /// Seeded registry answered by `query_foreign_objects`
    registry: RwLock<Vec<ForeignObject>>,
    /// Artifact root; artifacts are dropped when unset
    data_dir: Option<PathBuf>,
}

impl MemoryStore {
    /// Create a store persisting artifacts under `data_dir`
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            registry: RwLock::new(Vec::new()),
            data_dir,
        }
    }

    /// Seed the registry used for device name resolution
    pub async fn register_foreign(&self, object: ForeignObject) {
        self.registry.write().await.push(object);
    }

    /// Current value of a state, if any
    pub async fn state(&self, id: &str) -> Option<StateValue> {
        self.states.read().await.get(id).cloned()
    }
}

/// Glob-style match supporting `*` wildcards only
fn wildcard_match(pattern: &str, input: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == input;
    }

    let mut rest = match input.strip_prefix(segments[0]) {
        Some(rest) => rest,
        None => return false,
    };
    for segment in &segments[1..segments.len() - 1] {
        match rest.find(segment) {
            Some(idx) => rest = &rest[idx + segment.len()..],
            None => return false,
        }
    }
    rest.ends_with(segments[segments.len() - 1])
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn ensure_object(&self, id: &str, descriptor: ObjectDescriptor) -> Result<()> {
        let mut objects = self.objects.write().await;
        objects.entry(id.to_string()).or_insert(descriptor);
        Ok(())
    }

    async fn set_state(&self, id: &str, value: StateValue, _ack: bool) -> Result<()> {
        tracing::debug!(id = %id, value = ?value, "State written");
        self.states.write().await.insert(id.to_string(), value);
        Ok(())
    }

    async fn set_state_if_changed(&self, id: &str, value: StateValue, ack: bool) -> Result<()> {
        {
            let states = self.states.read().await;
            if states.get(id) == Some(&value) {
                return Ok(());
            }
        }
        self.set_state(id, value, ack).await
    }

    async fn query_foreign_objects(
        &self,
        pattern: &str,
        _object_type: &str,
    ) -> Result<Vec<ForeignObject>> {
        let registry = self.registry.read().await;
        Ok(registry
            .iter()
            .filter(|o| wildcard_match(pattern, &o.id))
            .cloned()
            .collect())
    }

    async fn persist_file(&self, relative_dir: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        let Some(ref root) = self.data_dir else {
            tracing::trace!(filename = %filename, "No data dir configured, artifact dropped");
            return Ok(());
        };

        let dir = root.join(relative_dir);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        fs::write(&path, bytes).await?;

        tracing::debug!(
            path = %path.display(),
            size = bytes.len(),
            "Saved artifact"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_substring() {
        assert!(wildcard_match("*AABBCC*", "alias.0.AABBCCDDEEFF"));
        assert!(wildcard_match("cam.*", "cam.front"));
        assert!(!wildcard_match("*AABBCC*", "alias.0.112233445566"));
    }

    #[tokio::test]
    async fn ensure_object_is_idempotent() {
        let store = MemoryStore::new(None);
        let first = ObjectDescriptor::indicator("VMD");
        let second = ObjectDescriptor::indicator("other");
        store.ensure_object("a.VMD", first.clone()).await.unwrap();
        store.ensure_object("a.VMD", second).await.unwrap();
        let objects = store.objects.read().await;
        assert_eq!(objects.get("a.VMD"), Some(&first));
    }

    #[tokio::test]
    async fn set_state_if_changed_skips_equal_value() {
        let store = MemoryStore::new(None);
        store.set_state("k", true.into(), true).await.unwrap();
        store
            .set_state_if_changed("k", true.into(), true)
            .await
            .unwrap();
        assert_eq!(store.state("k").await, Some(StateValue::Bool(true)));
    }
}
