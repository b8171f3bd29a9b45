//! Recording doubles shared by module tests

use super::{ForeignObject, ObjectDescriptor, Relay, StateValue, Store};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One recorded store mutation
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    EnsureObject {
        id: String,
        descriptor: ObjectDescriptor,
    },
    SetState {
        id: String,
        value: StateValue,
        ack: bool,
    },
    PersistFile {
        dir: String,
        filename: String,
        len: usize,
    },
}

/// Store double recording every materialized mutation
#[derive(Default)]
pub struct RecordingStore {
    ops: Mutex<Vec<StoreOp>>,
    states: Mutex<HashMap<String, StateValue>>,
    foreign: Vec<ForeignObject>,
    query_count: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_foreign(foreign: Vec<ForeignObject>) -> Self {
        Self {
            foreign,
            ..Self::default()
        }
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn state(&self, id: &str) -> Option<StateValue> {
        self.states.lock().unwrap().get(id).cloned()
    }

    /// Boolean values written to `id`, in order (changed-writes only)
    pub fn bool_writes(&self, id: &str) -> Vec<bool> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::SetState {
                    id: op_id,
                    value: StateValue::Bool(v),
                    ..
                } if op_id == id => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Text values written to `id`, in order
    pub fn text_writes(&self, id: &str) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::SetState {
                    id: op_id,
                    value: StateValue::Text(v),
                    ..
                } if op_id == id => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn ensure_count(&self, id: &str) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, StoreOp::EnsureObject { id: op_id, .. } if op_id == id))
            .count()
    }

    pub fn persisted(&self) -> Vec<(String, String, usize)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::PersistFile { dir, filename, len } => Some((dir, filename, len)),
                _ => None,
            })
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Store for RecordingStore {
    async fn ensure_object(&self, id: &str, descriptor: ObjectDescriptor) -> Result<()> {
        self.ops.lock().unwrap().push(StoreOp::EnsureObject {
            id: id.to_string(),
            descriptor,
        });
        Ok(())
    }

    async fn set_state(&self, id: &str, value: StateValue, ack: bool) -> Result<()> {
        self.states
            .lock()
            .unwrap()
            .insert(id.to_string(), value.clone());
        self.ops.lock().unwrap().push(StoreOp::SetState {
            id: id.to_string(),
            value,
            ack,
        });
        Ok(())
    }

    async fn set_state_if_changed(&self, id: &str, value: StateValue, ack: bool) -> Result<()> {
        if self.states.lock().unwrap().get(id) == Some(&value) {
            return Ok(());
        }
        self.set_state(id, value, ack).await
    }

    async fn query_foreign_objects(
        &self,
        pattern: &str,
        _object_type: &str,
    ) -> Result<Vec<ForeignObject>> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        let needle = pattern.trim_matches('*');
        Ok(self
            .foreign
            .iter()
            .filter(|o| o.id.contains(needle))
            .cloned()
            .collect())
    }

    async fn persist_file(&self, relative_dir: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        self.ops.lock().unwrap().push(StoreOp::PersistFile {
            dir: relative_dir.to_string(),
            filename: filename.to_string(),
            len: bytes.len(),
        });
        Ok(())
    }
}

/// Relay double recording every send
#[derive(Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<(String, Option<String>, serde_json::Value)>>,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Option<String>, serde_json::Value)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Relay for RecordingRelay {
    async fn send(
        &self,
        target: &str,
        command: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.sent.lock().unwrap().push((
            target.to_string(),
            command.map(|c| c.to_string()),
            payload,
        ));
        Ok(())
    }
}
