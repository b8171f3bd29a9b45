//! Hub boundary - injected collaborator interfaces
//!
//! ## Responsibilities
//!
//! - `Store` trait: object/state table plus artifact persistence
//! - `Relay` trait: downstream payload forwarding
//! - Concrete implementations used by the binary
//!
//! The core pipeline only sees these traits; it is unaware of whatever
//! host actually owns the object tree.

pub mod memory;
pub mod relay;

#[cfg(test)]
pub mod testing;

use crate::error::Result;
use serde::Serialize;

pub use memory::MemoryStore;
pub use relay::{HttpRelay, LogRelay};

/// Value carried by a state write
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Text(String),
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Descriptor for an object in the external tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDescriptor {
    /// Object kind: "device", "channel" or "state"
    pub object_type: String,
    /// Display name
    pub name: String,
    /// State role (states only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// State value type (states only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Host-specific payload (mac/ip/serial for devices)
    pub native: serde_json::Value,
}

impl ObjectDescriptor {
    /// Device object carrying network identity in its native payload
    pub fn device(name: impl Into<String>, native: serde_json::Value) -> Self {
        Self {
            object_type: "device".to_string(),
            name: name.into(),
            role: None,
            value_type: None,
            native,
        }
    }

    /// Grouping channel below a device
    pub fn channel(name: impl Into<String>) -> Self {
        Self {
            object_type: "channel".to_string(),
            name: name.into(),
            role: None,
            value_type: None,
            native: serde_json::json!({}),
        }
    }

    /// Boolean indicator state (one alarm flag)
    pub fn indicator(name: impl Into<String>) -> Self {
        Self {
            object_type: "state".to_string(),
            name: name.into(),
            role: Some("indicator".to_string()),
            value_type: Some("boolean".to_string()),
            native: serde_json::json!({}),
        }
    }

    /// Text status state (connection aggregate)
    pub fn text_state(name: impl Into<String>) -> Self {
        Self {
            object_type: "state".to_string(),
            name: name.into(),
            role: Some("text".to_string()),
            value_type: Some("string".to_string()),
            native: serde_json::json!({}),
        }
    }
}

/// Object returned by a registry query
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignObject {
    pub id: String,
    pub name: Option<String>,
}

/// External object/state store consumed by the pipeline
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Idempotently create an object; existing objects are left untouched
    async fn ensure_object(&self, id: &str, descriptor: ObjectDescriptor) -> Result<()>;

    /// Write a state value
    async fn set_state(&self, id: &str, value: StateValue, ack: bool) -> Result<()>;

    /// Write a state value only if it differs from the current one
    async fn set_state_if_changed(&self, id: &str, value: StateValue, ack: bool) -> Result<()>;

    /// Pattern query over the wider object registry (`*` wildcards)
    async fn query_foreign_objects(
        &self,
        pattern: &str,
        object_type: &str,
    ) -> Result<Vec<ForeignObject>>;

    /// Persist an artifact under `<relative_dir>/<filename>`
    async fn persist_file(&self, relative_dir: &str, filename: &str, bytes: &[u8]) -> Result<()>;
}

/// Downstream relay target consumed by the dispatcher
#[async_trait::async_trait]
pub trait Relay: Send + Sync {
    /// Forward a payload to a named target, optionally with a sub-command
    async fn send(
        &self,
        target: &str,
        command: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()>;
}
