//! Dispatcher - downstream payload forwarding
//!
//! ## Responsibilities
//!
//! - Render relay payloads from the validated templates
//! - Enforce per-channel throttling through the ThrottleGate
//! - Swallow every dispatch failure: an event always completes its
//!   pipeline regardless of relay outcome

pub mod template;
pub mod throttle;

use crate::decoder::Event;
use crate::error::Result;
use crate::hub::Relay;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use template::{PayloadTemplate, TemplateContext};
use throttle::{RelayChannelKind, ThrottleGate};

/// One relay channel as configured
#[derive(Debug, Clone, Deserialize)]
pub struct RelayChannelConfig {
    /// Relay target identifier
    pub target: String,
    /// Optional sub-command understood by the target
    #[serde(default)]
    pub command: Option<String>,
    /// Payload template (see `template::FIELDS`)
    pub template: serde_json::Value,
    /// Suppression window after a successful send, 0 = no throttle
    #[serde(default)]
    pub throttle_ms: u64,
    /// Throttle per device instead of globally
    #[serde(default)]
    pub per_device: bool,
}

/// Both relay channels; either may be absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatcherConfig {
    pub notification: Option<RelayChannelConfig>,
    pub image: Option<RelayChannelConfig>,
}

struct CompiledChannel {
    target: String,
    command: Option<String>,
    template: PayloadTemplate,
    window: Duration,
    per_device: bool,
}

impl CompiledChannel {
    fn compile(config: RelayChannelConfig) -> Result<Self> {
        Ok(Self {
            template: PayloadTemplate::compile(config.template)?,
            target: config.target,
            command: config.command,
            window: Duration::from_millis(config.throttle_ms),
            per_device: config.per_device,
        })
    }
}

/// Throttled forwarder for both relay channels
pub struct Dispatcher {
    relay: Arc<dyn Relay>,
    gate: Arc<ThrottleGate>,
    notification: Option<CompiledChannel>,
    image: Option<CompiledChannel>,
}

impl Dispatcher {
    /// Compile the channel templates; invalid templates fail startup
    pub fn new(
        relay: Arc<dyn Relay>,
        gate: Arc<ThrottleGate>,
        config: DispatcherConfig,
    ) -> Result<Self> {
        Ok(Self {
            relay,
            gate,
            notification: config
                .notification
                .map(CompiledChannel::compile)
                .transpose()?,
            image: config.image.map(CompiledChannel::compile).transpose()?,
        })
    }

    /// Forward the XML notification
    pub async fn dispatch_notification(&self, event: &Event, device_name: &str, xml: &str) {
        let Some(ref channel) = self.notification else {
            return;
        };
        let context = base_context(event, device_name).set("xml", xml);
        self.dispatch(RelayChannelKind::Notification, channel, event, context)
            .await;
    }

    /// Forward one snapshot image
    pub async fn dispatch_image(&self, event: &Event, device_name: &str, jpeg: &[u8]) {
        let Some(ref channel) = self.image else {
            return;
        };
        let context = base_context(event, device_name).set("image", BASE64.encode(jpeg));
        self.dispatch(RelayChannelKind::Image, channel, event, context)
            .await;
    }

    async fn dispatch(
        &self,
        kind: RelayChannelKind,
        channel: &CompiledChannel,
        event: &Event,
        context: TemplateContext,
    ) {
        let device_id = event.device_id();
        let device = channel.per_device.then_some(device_id.as_str());
        if !self.gate.try_acquire(kind, device, channel.window).await {
            tracing::debug!(
                channel = kind.as_str(),
                device = %device_id,
                "Send suppressed by throttle"
            );
            return;
        }

        let payload = channel.template.render(&context);
        if let Err(e) = self
            .relay
            .send(&channel.target, channel.command.as_deref(), payload)
            .await
        {
            tracing::warn!(
                channel = kind.as_str(),
                target = %channel.target,
                error = %e,
                "Dispatch failed"
            );
        }
    }
}

fn base_context(event: &Event, device_name: &str) -> TemplateContext {
    TemplateContext::new()
        .set("device", event.device_id())
        .set("device_name", device_name)
        .set("event_type", event.event_type.clone())
        .set("channel", event.channel_name.clone().unwrap_or_default())
        .set(
            "detection_target",
            event.detection_target.clone().unwrap_or_default(),
        )
        .set("ip", event.ip_address.clone().unwrap_or_default())
        .set("serial", event.serial_number.clone().unwrap_or_default())
        .set("timestamp", event.timestamp.to_rfc3339())
        .set("file_base", event.file_base())
}
