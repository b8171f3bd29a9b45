//! Namespace-agnostic XML field extraction
//!
//! Camera notification documents come with or without namespace
//! prefixes and wrapper elements depending on firmware. Matching is by
//! local tag name only; the first occurrence wins.

/// Extract the text content of the first `<tag>` element
pub fn extract_value(xml: &str, tag: &str) -> Option<String> {
    let patterns = [format!("<{}>", tag), format!(":{}>", tag)];

    for pattern in &patterns {
        if let Some(start) = xml.find(pattern.as_str()) {
            let content = &xml[start + pattern.len()..];
            if let Some(end) = content.find("</") {
                let value = content[..end].trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Extract the inner section of the first `<tag>...</tag>` element
pub fn extract_section<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let patterns = [format!("<{}>", tag), format!(":{}>", tag)];

    for pattern in &patterns {
        if let Some(start) = xml.find(pattern.as_str()) {
            let content = &xml[start + pattern.len()..];
            if let Some(end) = find_close(content, tag) {
                return Some(&content[..end]);
            }
        }
    }
    None
}

/// Position of the first close tag matching `tag` by local name
fn find_close(content: &str, tag: &str) -> Option<usize> {
    let mut search = 0;
    while let Some(rel) = content[search..].find("</") {
        let idx = search + rel;
        let gt = content[idx..].find('>')?;
        let name = &content[idx + 2..idx + gt];
        let local = name.rsplit(':').next().unwrap_or(name);
        if local.trim() == tag {
            return Some(idx);
        }
        search = idx + gt + 1;
    }
    None
}
