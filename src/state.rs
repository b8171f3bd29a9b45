//! Application state
//!
//! Holds the configuration and the shared pipeline components.

use crate::alarm_state::AlarmStateService;
use crate::connection_tracker::ConnectionTracker;
use crate::dispatcher::throttle::ThrottleGate;
use crate::event_pipeline::EventPipeline;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Debounce window: how long an indicator stays True after the
    /// last matching event
    pub alarm_timeout_ms: u64,
    /// Idle window after which a device counts as disconnected
    pub connection_timeout_ms: u64,
    /// Artifact root (XML/JPEG persistence); unset = no persistence
    pub data_dir: Option<PathBuf>,
    /// Persist the notification document per event
    pub save_xml: bool,
    /// Persist (annotated) snapshots per event
    pub save_images: bool,
    /// Draw detection boxes onto snapshots
    pub annotate_images: bool,
    /// Detection box color as `#RRGGBB`
    pub annotation_color: String,
    /// Detection box stroke width in pixels
    pub annotation_line_width: u32,
    /// Downstream relay endpoint; unset = log-only relay
    pub relay_url: Option<String>,
    /// Path to the relay channel config JSON
    pub relay_config: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8089),
            alarm_timeout_ms: std::env::var("ALARM_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            connection_timeout_ms: std::env::var("CONNECTION_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600_000),
            data_dir: std::env::var("DATA_DIR").ok().map(PathBuf::from),
            save_xml: std::env::var("SAVE_XML")
                .map(|v| v == "true")
                .unwrap_or(false),
            save_images: std::env::var("SAVE_IMAGES")
                .map(|v| v == "true")
                .unwrap_or(false),
            annotate_images: std::env::var("ANNOTATE_IMAGES")
                .map(|v| v != "false")
                .unwrap_or(true),
            annotation_color: std::env::var("ANNOTATION_COLOR")
                .unwrap_or_else(|_| "#FF0000".to_string()),
            annotation_line_width: std::env::var("ANNOTATION_LINE_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            relay_url: std::env::var("RELAY_URL").ok(),
            relay_config: std::env::var("RELAY_CONFIG").ok().map(PathBuf::from),
        }
    }
}

impl AppConfig {
    pub fn alarm_timeout(&self) -> Duration {
        Duration::from_millis(self.alarm_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Annotator settings derived from the raw config values
    pub fn annotator_config(&self) -> crate::annotator::AnnotatorConfig {
        let box_color = crate::annotator::parse_hex_color(&self.annotation_color)
            .unwrap_or_else(|| {
                tracing::warn!(
                    color = %self.annotation_color,
                    "Unparseable annotation color, using red"
                );
                image::Rgb([255, 0, 0])
            });
        crate::annotator::AnnotatorConfig {
            enabled: self.annotate_images,
            line_width: self.annotation_line_width,
            box_color,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Per-request pipeline
    pub pipeline: Arc<EventPipeline>,
    /// Debounce state machine (drained on shutdown)
    pub alarm: Arc<AlarmStateService>,
    /// Send rate limiter (cleared on shutdown)
    pub throttle: Arc<ThrottleGate>,
    /// Device liveness tracking (cancelled on shutdown)
    pub connections: Arc<ConnectionTracker>,
}

#[cfg(test)]
impl AppState {
    /// Minimal state over in-memory collaborators
    pub fn for_tests() -> Self {
        use crate::annotator::{Annotator, AnnotatorConfig};
        use crate::dispatcher::{Dispatcher, DispatcherConfig};
        use crate::hub::{LogRelay, MemoryStore, Relay, Store};
        use crate::name_resolver::DeviceNameResolver;

        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            alarm_timeout_ms: 5000,
            connection_timeout_ms: 600_000,
            data_dir: None,
            save_xml: false,
            save_images: false,
            annotate_images: true,
            annotation_color: "#FF0000".to_string(),
            annotation_line_width: 2,
            relay_url: None,
            relay_config: None,
        };

        let store = Arc::new(MemoryStore::new(None)) as Arc<dyn Store>;
        let relay = Arc::new(LogRelay) as Arc<dyn Relay>;
        let resolver = Arc::new(DeviceNameResolver::new(store.clone()));
        let throttle = Arc::new(ThrottleGate::new());
        let alarm = Arc::new(AlarmStateService::new(store.clone(), config.alarm_timeout()));
        let connections = Arc::new(ConnectionTracker::new(
            store.clone(),
            resolver.clone(),
            config.connection_timeout(),
        ));
        let dispatcher = Dispatcher::new(relay, throttle.clone(), DispatcherConfig::default())
            .expect("empty dispatcher config is valid");
        let pipeline = Arc::new(EventPipeline::new(
            alarm.clone(),
            Annotator::new(AnnotatorConfig::default()),
            dispatcher,
            connections.clone(),
            resolver,
            store,
            config.save_xml,
            config.save_images,
        ));

        Self {
            config,
            pipeline,
            alarm,
            throttle,
            connections,
        }
    }
}
