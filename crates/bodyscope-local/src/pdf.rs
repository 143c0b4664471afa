//! PDF metadata without rendering.
//!
//! The document is opened through its cross-reference table (`lopdf`) to count pages and read the
//! `/Info` dictionary. An encrypted file that the empty user password does not unlock is
//! `PasswordProtected`; when it cannot even be parsed, a raw byte scan still recovers the header
//! version and a plain-text `/Title(...)` literal, both best effort.

use bodyscope_core::{PdfLoadState, PdfMetadata};
use lopdf::{Dictionary, Document, Object};
use std::sync::OnceLock;

/// How far into the file the `%PDF-` header is searched for.
const HEADER_SCAN_BYTES: usize = 1024;

/// Version literal after `%PDF-` (digits and dots only).
pub fn pdf_version_from_bytes(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(HEADER_SCAN_BYTES)];
    let at = head.windows(5).position(|w| w == b"%PDF-")?;
    let version: String = bytes[at + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|b| *b as char)
        .collect();
    (!version.is_empty()).then_some(version)
}

fn title_regex() -> Option<&'static regex::bytes::Regex> {
    static RE: OnceLock<Option<regex::bytes::Regex>> = OnceLock::new();
    RE.get_or_init(|| regex::bytes::Regex::new(r"(?s-u)/Title\s*\(((?:\\.|[^\\)])*)\)").ok())
        .as_ref()
}

fn unescape_literal(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut it = raw.iter().copied();
    while let Some(b) = it.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match it.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise treated as Latin-1.
fn decode_pdf_text(bytes: &[u8]) -> Option<String> {
    let s = if let Some(rest) = bytes.strip_prefix(b"\xfe\xff") {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|b| *b as char).collect()
    };
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

/// First `/Title(...)` literal in the raw byte stream.
///
/// Titles with control characters or undecodable UTF-16 are dropped: in an encrypted file they
/// are ciphertext.
pub fn pdf_title_from_bytes(bytes: &[u8]) -> Option<String> {
    let caps = title_regex()?.captures(bytes)?;
    let raw = caps.get(1)?.as_bytes();
    decode_pdf_text(&unescape_literal(raw))
        .filter(|t| !t.chars().any(|c| c.is_control() || c == char::REPLACEMENT_CHARACTER))
}

fn has_encrypt_dict(bytes: &[u8]) -> bool {
    bytes.windows(8).any(|w| w == b"/Encrypt")
}

fn info_dict(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => decode_pdf_text(bytes),
        _ => None,
    }
}

/// Metadata readable from the unparsed byte stream alone.
fn raw_metadata(bytes: &[u8]) -> PdfMetadata {
    PdfMetadata {
        page_count: 0,
        title: pdf_title_from_bytes(bytes),
        file_size: bytes.len() as u64,
        version: pdf_version_from_bytes(bytes),
        password_protected: has_encrypt_dict(bytes),
        ..PdfMetadata::default()
    }
}

/// Open the document structure and report its metadata as a terminal [`PdfLoadState`].
///
/// Never fails: unreadable encrypted files become `PasswordProtected`, anything else that cannot
/// be opened becomes `Error`. The returned `Success` carries no thumbnail; see
/// [`crate::render::PdfInspector`] for rendering.
pub fn extract_pdf_metadata(bytes: &[u8]) -> PdfLoadState {
    // lopdf can panic on some malformed xref tables.
    let loaded = std::panic::catch_unwind(|| Document::load_mem(bytes));
    let doc = match loaded {
        Ok(Ok(doc)) => doc,
        Ok(Err(e)) => return open_failure(bytes, e.to_string()),
        Err(_) => return open_failure(bytes, "pdf parser panicked".to_string()),
    };

    let encrypted = doc.is_encrypted();
    if encrypted && doc.encryption_state.is_none() {
        tracing::debug!("encrypted pdf needs a user password");
        return PdfLoadState::PasswordProtected {
            metadata: locked_metadata(bytes, &doc),
        };
    }

    let mut metadata = raw_metadata(bytes);
    if encrypted {
        metadata.title = None;
        metadata.password_protected = true;
    }
    metadata.page_count = u32::try_from(doc.get_pages().len()).unwrap_or(u32::MAX);
    if !doc.version.trim().is_empty() {
        metadata.version = Some(doc.version.trim().to_string());
    }
    if let Some(info) = info_dict(&doc) {
        metadata.title = info_string(info, b"Title").or(metadata.title);
        metadata.author = info_string(info, b"Author");
        metadata.creator = info_string(info, b"Creator");
        metadata.creation_date = info_string(info, b"CreationDate");
    }
    PdfLoadState::Success {
        thumbnail: None,
        metadata,
    }
}

/// What is readable without the key: strings in the body are ciphertext.
fn locked_metadata(bytes: &[u8], doc: &Document) -> PdfMetadata {
    let version = Some(doc.version.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| pdf_version_from_bytes(bytes));
    PdfMetadata {
        file_size: bytes.len() as u64,
        version,
        password_protected: true,
        ..PdfMetadata::default()
    }
}

fn open_failure(bytes: &[u8], message: String) -> PdfLoadState {
    if has_encrypt_dict(bytes) {
        tracing::debug!(error = %message, "encrypted pdf could not be opened");
        let mut metadata = raw_metadata(bytes);
        metadata.password_protected = true;
        return PdfLoadState::PasswordProtected { metadata };
    }
    tracing::warn!(error = %message, "pdf open failed");
    PdfLoadState::Error { message }
}
