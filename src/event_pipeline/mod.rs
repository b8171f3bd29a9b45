//! EventPipeline - per-request orchestration
//!
//! ## Responsibilities
//!
//! - Run one inbound notification through decode, alarm state,
//!   annotation, artifact persistence and dispatch
//! - Mark the device live once its event was accepted
//!
//! Decode failures drop the request (it is still acknowledged at the
//! HTTP layer). Once the alarm transition is committed, no later step
//! may prevent or roll it back; annotation, persistence and dispatch
//! failures only log.

use crate::alarm_state::AlarmStateService;
use crate::annotator::Annotator;
use crate::connection_tracker::ConnectionTracker;
use crate::decoder::Decoder;
use crate::dispatcher::Dispatcher;
use crate::hub::Store;
use crate::name_resolver::DeviceNameResolver;
use axum::http::HeaderMap;
use chrono::Utc;
use std::sync::Arc;

/// One-request-one-unit-of-work pipeline
pub struct EventPipeline {
    decoder: Decoder,
    alarm: Arc<AlarmStateService>,
    annotator: Annotator,
    dispatcher: Dispatcher,
    connections: Arc<ConnectionTracker>,
    resolver: Arc<DeviceNameResolver>,
    store: Arc<dyn Store>,
    save_xml: bool,
    save_images: bool,
}

impl EventPipeline {
    pub fn new(
        alarm: Arc<AlarmStateService>,
        annotator: Annotator,
        dispatcher: Dispatcher,
        connections: Arc<ConnectionTracker>,
        resolver: Arc<DeviceNameResolver>,
        store: Arc<dyn Store>,
        save_xml: bool,
        save_images: bool,
    ) -> Self {
        Self {
            decoder: Decoder,
            alarm,
            annotator,
            dispatcher,
            connections,
            resolver,
            store,
            save_xml,
            save_images,
        }
    }

    /// Process one inbound request; never errors outward
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) {
        let decoded = match self.decoder.decode(headers, body, Utc::now()) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(error = %e, "Notification dropped");
                return;
            }
        };

        let event = &decoded.event;
        let device_id = event.device_id();
        tracing::debug!(
            device = %device_id,
            event_type = %event.event_type,
            images = decoded.images.len(),
            "Notification decoded"
        );

        if let Err(e) = self.alarm.process(event).await {
            tracing::error!(
                key = %event.state_key(),
                error = %e,
                "Alarm state transition failed"
            );
            return;
        }

        let device_name = self.resolver.resolve(&device_id).await;
        let period = event.period_path();
        let file_base = event.file_base();

        if self.save_xml {
            self.persist(&period, format!("{}.xml", file_base), decoded.xml.as_bytes())
                .await;
        }

        for (index, image) in decoded.images.iter().enumerate() {
            let buffer = match (&event.target_rect, self.annotator.enabled()) {
                (Some(rect), true) => {
                    self.annotator
                        .annotate(image, rect, event.detection_target.as_deref())
                }
                _ => image.clone(),
            };

            if self.save_images {
                let filename = if index == 0 {
                    format!("{}.jpg", file_base)
                } else {
                    format!("{}-{}.jpg", file_base, index)
                };
                self.persist(&period, filename, &buffer).await;
            }

            self.dispatcher
                .dispatch_image(event, &device_name, &buffer)
                .await;
        }

        self.dispatcher
            .dispatch_notification(event, &device_name, &decoded.xml)
            .await;

        self.connections.mark_alive(&device_id).await;
    }

    async fn persist(&self, period: &str, filename: String, bytes: &[u8]) {
        if let Err(e) = self.store.persist_file(period, &filename, bytes).await {
            tracing::warn!(filename = %filename, error = %e, "Artifact persistence failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::AnnotatorConfig;
    use crate::connection_tracker::CONNECTION_STATE_ID;
    use crate::dispatcher::throttle::ThrottleGate;
    use crate::dispatcher::{DispatcherConfig, RelayChannelConfig};
    use crate::hub::testing::{RecordingRelay, RecordingStore};
    use axum::http::header::CONTENT_TYPE;
    use axum::http::HeaderValue;
    use image::codecs::jpeg::JpegEncoder;
    use image::{ImageBuffer, Rgb};
    use serde_json::json;
    use std::time::Duration;

    const XML_DOC: &str = "<EventNotificationAlert>\
        <macAddress>AA:BB:CC:DD:EE:FF</macAddress>\
        <eventType>VMD</eventType>\
        <dateTime>2026-03-01T12:30:45.123+02:00</dateTime>\
        <DetectionRegionList><DetectionRegionEntry>\
        <detectionTarget>human</detectionTarget>\
        <TargetRect><X>0.25</X><Y>0.25</Y><width>0.5</width><height>0.5</height></TargetRect>\
        </DetectionRegionEntry></DetectionRegionList>\
        </EventNotificationAlert>";

    fn pipeline(
        store: &Arc<RecordingStore>,
        relay: &Arc<RecordingRelay>,
    ) -> EventPipeline {
        let store_dyn = Arc::clone(store) as Arc<dyn Store>;
        let resolver = Arc::new(DeviceNameResolver::new(store_dyn.clone()));
        let alarm = Arc::new(AlarmStateService::new(
            store_dyn.clone(),
            Duration::from_secs(5),
        ));
        let connections = Arc::new(ConnectionTracker::new(
            store_dyn.clone(),
            resolver.clone(),
            Duration::from_secs(600),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(relay) as Arc<dyn crate::hub::Relay>,
            Arc::new(ThrottleGate::new()),
            DispatcherConfig {
                notification: Some(RelayChannelConfig {
                    target: "notifier.0".to_string(),
                    command: None,
                    template: json!({ "text": "{event_type}" }),
                    throttle_ms: 0,
                    per_device: false,
                }),
                image: Some(RelayChannelConfig {
                    target: "gallery.0".to_string(),
                    command: None,
                    template: json!({ "photo": "{image}" }),
                    throttle_ms: 0,
                    per_device: false,
                }),
            },
        )
        .unwrap();

        EventPipeline::new(
            alarm,
            Annotator::new(AnnotatorConfig::default()),
            dispatcher,
            connections,
            resolver,
            store_dyn,
            true,
            true,
        )
    }

    fn sample_jpeg() -> Vec<u8> {
        let image = ImageBuffer::from_pixel(32, 32, Rgb::<u8>([10, 20, 30]));
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, 90)
            .encode_image(&image)
            .unwrap();
        buffer
    }

    fn multipart_request() -> (HeaderMap, Vec<u8>) {
        let mut body = Vec::new();
        body.extend_from_slice(b"--MIME\r\n");
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"doc\"\r\n\r\n");
        body.extend_from_slice(XML_DOC.as_bytes());
        body.extend_from_slice(b"\r\n--MIME\r\n");
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"snap\"; filename=\"snap.jpg\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&sample_jpeg());
        body.extend_from_slice(b"\r\n--MIME--\r\n");

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=MIME"),
        );
        (headers, body)
    }

    #[tokio::test(start_paused = true)]
    async fn multipart_request_runs_the_whole_pipeline() {
        let store = Arc::new(RecordingStore::new());
        let relay = Arc::new(RecordingRelay::new());
        let pipeline = pipeline(&store, &relay);

        let (headers, body) = multipart_request();
        pipeline.handle(&headers, &body).await;

        // Alarm raised
        assert_eq!(store.bool_writes("AABBCCDDEEFF.human.VMD"), vec![true]);

        // XML and annotated image persisted under the event's day
        let persisted = store.persisted();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].0, "20260301");
        assert_eq!(persisted[0].1, "123045123-AABBCCDDEEFF-VMD.xml");
        assert_eq!(persisted[1].1, "123045123-AABBCCDDEEFF-VMD.jpg");

        // Both relay channels fired
        let sent = relay.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "gallery.0");
        assert_eq!(sent[1].0, "notifier.0");
        assert_eq!(sent[1].2, json!({ "text": "VMD" }));

        // Device marked connected
        assert_eq!(
            store.text_writes(CONNECTION_STATE_ID),
            vec!["AABBCCDDEEFF".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_request_has_no_side_effects() {
        let store = Arc::new(RecordingStore::new());
        let relay = Arc::new(RecordingRelay::new());
        let pipeline = pipeline(&store, &relay);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        pipeline
            .handle(&headers, b"<EventNotificationAlert><eventType>VMD</eventType></EventNotificationAlert>")
            .await;

        assert!(store.ops().is_empty());
        assert!(relay.sent().is_empty());
    }
}
