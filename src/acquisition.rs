use lopdf::content::Content;
use lopdf::{Document, Object};
use tracing::{debug, warn};

use crate::config::AcquisitionConfig;
use crate::error::{K1Error, K1Result};

/// Text pulled from a PDF's native layer, before quality assessment.
#[derive(Debug, Clone)]
pub struct AcquiredText {
    pub text: String,
    pub page_count: usize,
    /// True when any AcroForm field values were merged into the text.
    pub has_form_values: bool,
}

/// Acquires the text layer of a PDF. Primary extraction goes through
/// pdf-extract, which handles encodings and layout; when it produces
/// nothing, a raw lopdf content-stream walk recovers whatever string
/// operands the pages carry. Fillable K-1s keep their data in AcroForm
/// field values rather than page content, so those are harvested too.
pub struct PdfAcquirer {
    max_bytes: u64,
    limit_mb: u64,
}

impl PdfAcquirer {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            max_bytes: config.max_input_size_mb * 1024 * 1024,
            limit_mb: config.max_input_size_mb,
        }
    }

    /// Parse the container and pull its text layer. Fails only when the
    /// input is oversized or not a parseable PDF; a valid PDF with no text
    /// comes back with an empty string for the quality gate to reject.
    pub fn acquire(&self, bytes: &[u8]) -> K1Result<AcquiredText> {
        if bytes.len() as u64 > self.max_bytes {
            return Err(K1Error::InputTooLarge {
                limit_mb: self.limit_mb,
            });
        }

        // The header must appear near the start; some generators prepend a
        // few junk bytes, so scan a small window rather than byte 0 only.
        let window = &bytes[..bytes.len().min(1024)];
        if !window.windows(4).any(|w| w == b"%PDF") {
            return Err(K1Error::unreadable_pdf("missing %PDF header"));
        }

        let doc = Document::load_mem(bytes)
            .map_err(|e| K1Error::unreadable_pdf_with_source("failed to parse document", e))?;

        let page_count = doc.get_pages().len();
        debug!("parsed PDF container: {} pages", page_count);

        let mut text = match pdf_extract::extract_text_from_mem(bytes) {
            Ok(t) => t,
            Err(e) => {
                warn!("primary text extraction failed, trying content streams: {}", e);
                String::new()
            }
        };

        if text.trim().is_empty() {
            text = content_stream_text(&doc);
        }

        let form_text = form_field_text(&doc);
        let has_form_values = !form_text.is_empty();
        if has_form_values {
            debug!("harvested {} bytes of AcroForm field text", form_text.len());
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&form_text);
        }

        Ok(AcquiredText {
            text,
            page_count,
            has_form_values,
        })
    }
}

/// Walk every page's content stream and collect Tj/TJ string operands in
/// stream order. Loses layout but recovers text pdf-extract chokes on.
fn content_stream_text(doc: &Document) -> String {
    let mut out = String::new();

    for (page_num, page_id) in doc.get_pages() {
        let data = match doc.get_page_content(page_id) {
            Ok(data) => data,
            Err(e) => {
                warn!("skipping content of page {}: {}", page_num, e);
                continue;
            }
        };
        let content = match Content::decode(&data) {
            Ok(content) => content,
            Err(e) => {
                warn!("skipping undecodable stream on page {}: {}", page_num, e);
                continue;
            }
        };

        for op in &content.operations {
            match op.operator.as_str() {
                "Tj" | "'" | "\"" => {
                    for operand in &op.operands {
                        if let Object::String(s, _) = operand {
                            out.push_str(&String::from_utf8_lossy(s));
                            out.push(' ');
                        }
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(parts)) = op.operands.first() {
                        for part in parts {
                            if let Object::String(s, _) = part {
                                out.push_str(&String::from_utf8_lossy(s));
                            }
                        }
                        out.push(' ');
                    }
                }
                // Text-line moves become newlines so label/value pairs keep
                // their line structure for the pattern rules.
                "Td" | "TD" | "T*" => out.push('\n'),
                _ => {}
            }
        }
        out.push('\n');
    }

    out
}

/// Harvest AcroForm field values. Fillable K-1s produced by tax software
/// store partner data in /T (name) and /V (value) pairs that never appear
/// in page content. Emitted as "name: value" lines so label-based rules
/// can still anchor on them.
fn form_field_text(doc: &Document) -> String {
    let mut out = String::new();

    for (_, object) in doc.objects.iter() {
        let dict = match object {
            Object::Dictionary(dict) => dict,
            _ => continue,
        };

        let name = dict.get(b"T").ok().and_then(object_string);
        let value = dict.get(b"V").ok().and_then(object_string);

        if let (Some(name), Some(value)) = (name, value) {
            let value = value.trim();
            if !value.is_empty() {
                out.push_str(&name);
                out.push_str(": ");
                out.push_str(value);
                out.push('\n');
            }
        }
    }

    out
}

fn object_string(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}
