//! Decoder - notification request decoding
//!
//! ## Responsibilities
//!
//! - Dispatch on the content-type primary token (pure XML vs multipart)
//! - Classify multipart parts (XML document, JPEG snapshots)
//! - Parse the notification document into a validated `Event`
//! - Derive the deterministic artifact naming keys
//!
//! Decoding is stateless; independent requests never share state.

pub mod multipart;
pub mod xml;

use crate::error::{Error, Result};
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use chrono::{DateTime, FixedOffset, Utc};

/// Detection rectangle as carried in the notification document
///
/// Values are either fractions in 0-1 or integers in the 0-1000
/// normalized range; the annotator resolves the scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// One decoded alarm notification
#[derive(Debug, Clone)]
pub struct Event {
    pub mac_address: String,
    pub event_type: String,
    pub channel_name: Option<String>,
    pub detection_target: Option<String>,
    pub ip_address: Option<String>,
    pub serial_number: Option<String>,
    /// XML `dateTime` when parseable, ingestion time otherwise
    pub timestamp: DateTime<FixedOffset>,
    pub target_rect: Option<TargetRect>,
}

impl Event {
    /// Device id: mac address with separators stripped
    pub fn device_id(&self) -> String {
        self.mac_address
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect()
    }

    /// State identity: `device[.channel][.detectionTarget].eventType`
    pub fn state_key(&self) -> String {
        let mut key = self.device_id();
        if let Some(ref channel) = self.channel_name {
            key.push('.');
            key.push_str(channel);
        }
        if let Some(ref target) = self.detection_target {
            key.push('.');
            key.push_str(target);
        }
        key.push('.');
        key.push_str(&self.event_type);
        key
    }

    /// Day-granularity artifact directory (`YYYYMMDD`)
    pub fn period_path(&self) -> String {
        self.timestamp.format("%Y%m%d").to_string()
    }

    /// Sub-second artifact name stem (`HHMMSSmmm-device-eventType`)
    pub fn file_base(&self) -> String {
        format!(
            "{}-{}-{}",
            self.timestamp.format("%H%M%S%3f"),
            self.device_id(),
            self.event_type
        )
    }
}

/// Decoded request: the event, its raw document and any snapshots
#[derive(Debug, Clone)]
pub struct DecodedNotification {
    pub event: Event,
    pub xml: String,
    pub images: Vec<Vec<u8>>,
}

/// Stateless request decoder
pub struct Decoder;

impl Decoder {
    /// Decode an inbound request into an event plus snapshot buffers
    ///
    /// `received_at` is the ingestion time used when the document
    /// carries no parseable `dateTime`.
    pub fn decode(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<DecodedNotification> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::UnsupportedContentType("<missing>".to_string()))?;

        let primary = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        let (document, images) = match primary.as_str() {
            "application/xml" => (String::from_utf8_lossy(body).into_owned(), Vec::new()),
            "multipart/form-data" => {
                let boundary = boundary_param(content_type).ok_or_else(|| {
                    Error::Decode("Multipart content type without boundary".to_string())
                })?;
                classify_parts(multipart::split(body, &boundary)?)?
            }
            _ => return Err(Error::UnsupportedContentType(primary)),
        };

        let event = parse_event(&document, received_at)?;
        Ok(DecodedNotification {
            event,
            xml: document,
            images,
        })
    }
}

/// Extract the `boundary=` parameter from a content-type header value
fn boundary_param(content_type: &str) -> Option<String> {
    for param in content_type.split(';').skip(1) {
        let param = param.trim();
        if let Some(value) = param
            .strip_prefix("boundary=")
            .or_else(|| param.strip_prefix("BOUNDARY="))
        {
            return Some(value.trim_matches('"').to_string());
        }
    }
    None
}

/// Pick the XML document and snapshot buffers out of the part list
fn classify_parts(parts: Vec<multipart::Part>) -> Result<(String, Vec<Vec<u8>>)> {
    let mut document: Option<String> = None;
    let mut images = Vec::new();

    for part in parts {
        match part.content_type.as_deref() {
            None if part.filename.is_none() => {
                if document.is_some() {
                    tracing::warn!("Multiple XML parts in notification, keeping the first");
                } else {
                    document = Some(String::from_utf8_lossy(&part.body).into_owned());
                }
            }
            Some(ct) if ct.starts_with("image/jpeg") => images.push(part.body),
            other => {
                tracing::debug!(content_type = ?other, "Ignoring unclassified part");
            }
        }
    }

    match document {
        Some(document) => Ok((document, images)),
        None => Err(Error::Decode(
            "Multipart body without an XML part".to_string(),
        )),
    }
}

/// Parse the notification document into an `Event`
fn parse_event(document: &str, received_at: DateTime<Utc>) -> Result<Event> {
    let mac_address =
        xml::extract_value(document, "macAddress").ok_or(Error::MissingField("macAddress"))?;
    let event_type =
        xml::extract_value(document, "eventType").ok_or(Error::MissingField("eventType"))?;

    // Unparseable timestamps silently fall back to ingestion time
    let timestamp = xml::extract_value(document, "dateTime")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .unwrap_or_else(|| received_at.fixed_offset());

    let region = xml::extract_section(document, "DetectionRegionEntry");
    let detection_target = region.and_then(|r| xml::extract_value(r, "detectionTarget"));
    let target_rect = region
        .and_then(|r| xml::extract_section(r, "TargetRect"))
        .and_then(parse_rect);

    Ok(Event {
        mac_address,
        event_type,
        channel_name: xml::extract_value(document, "channelName"),
        detection_target,
        ip_address: xml::extract_value(document, "ipAddress"),
        serial_number: xml::extract_value(document, "serialNumber"),
        timestamp,
        target_rect,
    })
}

/// All four rect values must parse or the rect is dropped
fn parse_rect(section: &str) -> Option<TargetRect> {
    let field = |tag: &str| -> Option<f64> {
        xml::extract_value(section, tag).and_then(|v| v.parse().ok())
    };
    Some(TargetRect {
        x: field("X")?,
        y: field("Y")?,
        w: field("width")?,
        h: field("height")?,
    })
}
