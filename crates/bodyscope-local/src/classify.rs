//! Content classification from declared type + magic bytes + a text sniff.
//!
//! Classification is a pure function of its inputs and never fails: an inconclusive body ends up
//! as `PlainText` or `UnknownBinary`.

use bodyscope_core::ContentKind;
use std::borrow::Cow;

/// Fraction of printable chars a sample needs to count as text.
const PRINTABLE_RATIO: f64 = 0.90;

/// Lower-cased media type without parameters (`"Text/HTML; charset=x"` -> `"text/html"`).
pub fn content_type_essence(ct: Option<&str>) -> String {
    ct.unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Image format tag for a known image signature.
pub fn image_format_from_magic(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG") {
        return Some("PNG");
    }
    if bytes.starts_with(b"\xff\xd8\xff") {
        return Some("JPEG");
    }
    if bytes.starts_with(b"GIF8") {
        return Some("GIF");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("WEBP");
    }
    if bytes.starts_with(b"BM") {
        return Some("BMP");
    }
    if bytes.starts_with(b"\x00\x00\x01\x00") {
        return Some("ICO");
    }
    None
}

/// Sniff for PDF bytes (magic header).
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Kind implied by magic bytes alone, if they are conclusive.
pub fn magic_kind(prefix: &[u8]) -> Option<ContentKind> {
    if bytes_look_like_pdf(prefix) {
        return Some(ContentKind::Pdf);
    }
    image_format_from_magic(prefix).map(|_| ContentKind::Image)
}

/// Guess for whether text is an HTML document rather than generic markup.
pub fn text_looks_like_html(s: &str) -> bool {
    let head: String = s.trim_start().chars().take(16).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html")
        || head.starts_with("<html")
        || head.starts_with("<head")
        || head.starts_with("<body")
}

/// `boundary=` parameter of a multipart content-type, quotes stripped.
pub fn multipart_boundary(declared_type: Option<&str>) -> Option<String> {
    let ct = declared_type?;
    for param in ct.split(';').skip(1) {
        let Some((k, v)) = param.split_once('=') else {
            continue;
        };
        if !k.trim().eq_ignore_ascii_case("boundary") {
            continue;
        }
        let v = v.trim().trim_matches('"');
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }
    None
}

/// Decide the content kind of a body.
///
/// - `declared_type`: the `Content-Type` header, if any.
/// - `prefix`: the first bytes of the body (at least 12 for full magic coverage).
/// - `sniff`: decoded text of the prefix; derived from `prefix` when `None`.
pub fn classify(declared_type: Option<&str>, prefix: &[u8], sniff: Option<&str>) -> ContentKind {
    // Magic bytes are dispositive for binary formats.
    if let Some(kind) = magic_kind(prefix) {
        return kind;
    }

    let declared_lc = declared_type.unwrap_or("").to_ascii_lowercase();
    let essence = content_type_essence(declared_type);

    if declared_lc.contains("image/") {
        return ContentKind::Image;
    }
    if declared_lc.contains("pdf") {
        return ContentKind::Pdf;
    }

    let sniff: Cow<'_, str> = match sniff {
        Some(s) => Cow::Borrowed(s),
        None => String::from_utf8_lossy(prefix),
    };
    let sniff_trimmed = sniff.trim_start_matches('\u{feff}').trim_start();

    if essence == "application/json"
        || essence.ends_with("+json")
        || sniff_trimmed.starts_with('{')
        || sniff_trimmed.starts_with('[')
    {
        return ContentKind::Json;
    }

    if declared_lc.contains("html") {
        return ContentKind::Html;
    }
    if declared_lc.contains("xml") {
        return ContentKind::Xml;
    }
    if sniff_trimmed.starts_with('<') {
        return if text_looks_like_html(sniff_trimmed) {
            ContentKind::Html
        } else {
            ContentKind::Xml
        };
    }

    if essence == "application/x-www-form-urlencoded" {
        return ContentKind::FormData;
    }
    if essence.starts_with("multipart/") {
        return ContentKind::Multipart;
    }

    if bytes_look_like_text(prefix) {
        ContentKind::PlainText
    } else {
        ContentKind::UnknownBinary
    }
}

/// Valid UTF-8 with a high printable ratio.
///
/// A multi-byte sequence cut off at the end of the sample is tolerated, since the sample is
/// usually a prefix of a longer body.
pub fn bytes_look_like_text(sample: &[u8]) -> bool {
    let text = match std::str::from_utf8(sample) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => {
            // Truncated trailing sequence; the valid part is everything before it.
            match std::str::from_utf8(&sample[..e.valid_up_to()]) {
                Ok(s) => s,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    let mut total = 0usize;
    let mut printable = 0usize;
    for c in text.chars() {
        total += 1;
        if !c.is_control() || matches!(c, '\n' | '\r' | '\t') {
            printable += 1;
        }
    }
    if total == 0 {
        return true;
    }
    (printable as f64) / (total as f64) > PRINTABLE_RATIO
}
