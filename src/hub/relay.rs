//! Relay implementations
//!
//! `HttpRelay` posts payloads to a downstream HTTP endpoint; `LogRelay`
//! is the default sink when no relay URL is configured.

use super::Relay;
use crate::error::{Error, Result};
use serde_json::json;
use std::time::Duration;

/// Relay forwarding payloads as JSON over HTTP
pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    /// Create a relay posting to `<base_url>/<target>`
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }
}

#[async_trait::async_trait]
impl Relay for HttpRelay {
    async fn send(
        &self,
        target: &str,
        command: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), target);
        let body = json!({
            "command": command,
            "payload": payload,
        });

        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Relay(format!(
                "Relay target {} returned {}",
                target,
                resp.status()
            )));
        }

        tracing::debug!(target = %target, command = ?command, "Payload relayed");
        Ok(())
    }
}

/// Log-only relay used when no downstream endpoint is configured
pub struct LogRelay;

#[async_trait::async_trait]
impl Relay for LogRelay {
    async fn send(
        &self,
        target: &str,
        command: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()> {
        tracing::info!(
            target = %target,
            command = ?command,
            payload_bytes = payload.to_string().len(),
            "Relay send (log only)"
        );
        Ok(())
    }
}
