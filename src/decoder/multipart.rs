//! Multipart body splitting
//!
//! Cameras push `multipart/form-data` bodies with one XML part and any
//! number of JPEG snapshot parts. Splitting is by the raw boundary
//! token; per-part headers are reduced to the two fields the decoder
//! classifies on.

use crate::error::{Error, Result};

/// One body part with the headers relevant for classification
#[derive(Debug, Clone)]
pub struct Part {
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub body: Vec<u8>,
}

/// Split a multipart body along `--<boundary>` delimiters
pub fn split(body: &[u8], boundary: &str) -> Result<Vec<Part>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();

    let mut pos = match find(body, &delimiter, 0) {
        Some(idx) => idx,
        None => {
            return Err(Error::Decode(format!(
                "Multipart boundary {} not found in body",
                boundary
            )))
        }
    };

    loop {
        let segment_start = pos + delimiter.len();
        // Closing delimiter is "--boundary--"
        if body[segment_start..].starts_with(b"--") {
            break;
        }

        let next = find(body, &delimiter, segment_start);
        let segment_end = next.unwrap_or(body.len());
        let segment = &body[segment_start..segment_end];

        match parse_part(segment) {
            Some(part) => parts.push(part),
            None => tracing::warn!("Malformed multipart segment skipped"),
        }

        pos = match next {
            Some(idx) => idx,
            None => break,
        };
    }

    Ok(parts)
}

/// Parse one delimiter-stripped segment into headers + payload
fn parse_part(segment: &[u8]) -> Option<Part> {
    let segment = segment.strip_prefix(b"\r\n").unwrap_or(segment);
    let header_end = find(segment, b"\r\n\r\n", 0)?;
    let head = std::str::from_utf8(&segment[..header_end]).ok()?;
    let mut body = &segment[header_end + 4..];
    if body.ends_with(b"\r\n") {
        body = &body[..body.len() - 2];
    }

    let mut content_type = None;
    let mut filename = None;
    for line in head.split("\r\n") {
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-type:") {
            content_type = Some(value.trim().to_string());
        } else if lower.starts_with("content-disposition:") {
            filename = extract_filename(line);
        }
    }

    Some(Part {
        content_type,
        filename,
        body: body.to_vec(),
    })
}

/// Pull `filename="..."` out of a Content-Disposition line
fn extract_filename(line: &str) -> Option<String> {
    let lower = line.to_ascii_lowercase();
    let idx = lower.find("filename=")?;
    let value = line[idx + "filename=".len()..].trim();
    let value = value.split(';').next().unwrap_or(value).trim();
    Some(value.trim_matches('"').to_string())
}

/// First occurrence of `needle` in `haystack` at or after `from`
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| from + idx)
}
