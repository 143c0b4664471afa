use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("blob store error: {0}")]
    Store(String),
    #[error("chunk load failed: {0}")]
    Load(String),
    #[error("pdf error: {0}")]
    Pdf(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("background task failed: {0}")]
    Join(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Opaque identifier of a stored request/response body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub String);

impl BlobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Handle to a stored payload: id + declared content-type + total size.
///
/// `size` is `None` when the total is unknown (streaming bodies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyRef {
    pub id: BlobId,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

impl BodyRef {
    pub fn new(id: impl Into<BlobId>, content_type: Option<&str>, size: Option<u64>) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.map(|s| s.to_string()),
            size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Json,
    Xml,
    Html,
    FormData,
    Multipart,
    PlainText,
    Image,
    Pdf,
    UnknownBinary,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Json => "json",
            ContentKind::Xml => "xml",
            ContentKind::Html => "html",
            ContentKind::FormData => "form_data",
            ContentKind::Multipart => "multipart",
            ContentKind::PlainText => "plain_text",
            ContentKind::Image => "image",
            ContentKind::Pdf => "pdf",
            ContentKind::UnknownBinary => "unknown_binary",
        }
    }

    /// Kinds that are shown as text (and therefore searchable).
    pub fn is_text_like(self) -> bool {
        !matches!(
            self,
            ContentKind::Image | ContentKind::Pdf | ContentKind::UnknownBinary
        )
    }

    /// Kinds that go through binary metadata extraction.
    pub fn is_binary_structured(self) -> bool {
        matches!(self, ContentKind::Image | ContentKind::Pdf)
    }

    /// File extension + MIME type used when exporting a body of this kind.
    pub fn export_hint(self) -> (&'static str, &'static str) {
        match self {
            ContentKind::Json => ("json", "application/json"),
            ContentKind::Xml => ("xml", "application/xml"),
            ContentKind::Html => ("html", "text/html"),
            ContentKind::FormData => ("txt", "application/x-www-form-urlencoded"),
            ContentKind::Multipart => ("txt", "multipart/form-data"),
            ContentKind::PlainText => ("txt", "text/plain"),
            ContentKind::Image => ("img", "image/*"),
            ContentKind::Pdf => ("pdf", "application/pdf"),
            ContentKind::UnknownBinary => ("bin", "application/octet-stream"),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Upper-case format tag ("PNG", "JPEG", ...).
    pub format: String,
    pub file_size: u64,
    /// Whether the format can carry alpha. A format heuristic, not a pixel scan.
    pub has_alpha: bool,
    pub color_depth: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfMetadata {
    /// 0 is a valid "empty document" value.
    pub page_count: u32,
    pub title: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub creation_date: Option<String>,
    pub file_size: u64,
    pub version: Option<String>,
    pub password_protected: bool,
}

/// A rendered PDF page, PNG-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageThumbnail {
    pub page_index: u32,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing, default)]
    pub png: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PdfLoadState {
    Loading,
    Success {
        thumbnail: Option<PageThumbnail>,
        metadata: PdfMetadata,
    },
    Error {
        message: String,
    },
    PasswordProtected {
        metadata: PdfMetadata,
    },
}

impl PdfLoadState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PdfLoadState::Loading)
    }

    pub fn metadata(&self) -> Option<&PdfMetadata> {
        match self {
            PdfLoadState::Success { metadata, .. } | PdfLoadState::PasswordProtected { metadata } => {
                Some(metadata)
            }
            PdfLoadState::Loading | PdfLoadState::Error { .. } => None,
        }
    }
}

/// Half-open `[start, end)` byte range into one text snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchRange {
    pub start: usize,
    pub end: usize,
}

impl MatchRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps_or_touches(&self, other: &MatchRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A text buffer tagged with a version.
///
/// Match offsets are only meaningful against the exact snapshot they were computed from; the
/// version is how callers tell two snapshots apart without comparing the text.
#[derive(Debug, Clone)]
pub struct TextSnapshot {
    pub version: u64,
    pub text: Arc<str>,
}

impl TextSnapshot {
    pub fn new(version: u64, text: impl Into<Arc<str>>) -> Self {
        Self {
            version,
            text: text.into(),
        }
    }
}

/// Matches for one (snapshot, query) pair. Text and ranges travel together.
#[derive(Debug, Clone)]
pub struct MatchSet {
    pub snapshot: TextSnapshot,
    pub query: String,
    pub ranges: Arc<[MatchRange]>,
}

impl MatchSet {
    pub fn key(&self) -> (u64, &str) {
        (self.snapshot.version, self.query.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleTag {
    AllMatches,
    CurrentMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StyleSpan {
    pub range: MatchRange,
    pub style: StyleTag,
}

/// Text plus styling.
///
/// Invariants:
/// - `spans` are sorted, non-overlapping and all carry [`StyleTag::AllMatches`]
/// - `current`, when present, carries [`StyleTag::CurrentMatch`] and is drawn on top of `spans`
/// - every bound is a char boundary of `text`
#[derive(Debug, Clone)]
pub struct HighlightedText {
    pub text: Arc<str>,
    pub spans: Arc<[StyleSpan]>,
    pub current: Option<StyleSpan>,
}

/// A contiguous run of text with at most one style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub range: MatchRange,
    pub style: Option<StyleTag>,
}

impl HighlightedText {
    pub fn plain(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: text.into(),
            spans: Arc::from(Vec::new()),
            current: None,
        }
    }

    /// Flatten spans and the current overlay into adjacent, non-overlapping runs covering the
    /// whole text. The overlay wins where it intersects a span.
    pub fn segments(&self) -> Vec<Segment> {
        let len = self.text.len();
        let mut cuts = vec![0, len];
        for s in self.spans.iter().chain(self.current.iter()) {
            cuts.push(s.range.start.min(len));
            cuts.push(s.range.end.min(len));
        }
        cuts.sort_unstable();
        cuts.dedup();

        let mut out: Vec<Segment> = Vec::new();
        for w in cuts.windows(2) {
            let (start, end) = (w[0], w[1]);
            let covers = |r: &MatchRange| r.start <= start && end <= r.end;
            let style = if self.current.is_some_and(|c| covers(&c.range)) {
                Some(StyleTag::CurrentMatch)
            } else {
                // spans are sorted: the last span starting at or before `start` is the only candidate
                let i = self.spans.partition_point(|s| s.range.start <= start);
                (i > 0 && covers(&self.spans[i - 1].range)).then_some(StyleTag::AllMatches)
            };
            match out.last_mut() {
                Some(prev) if prev.style == style && prev.range.end == start => prev.range.end = end,
                _ => out.push(Segment {
                    range: MatchRange::new(start, end),
                    style,
                }),
            }
        }
        out
    }
}

/// Capture/persistence store the engine reads bodies from.
///
/// `Ok(None)` means "no body" and is not an error.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_body_bytes(&self, id: &BlobId) -> Result<Option<Vec<u8>>>;

    /// Decoded text, best effort.
    async fn get_body(&self, id: &BlobId) -> Result<Option<String>> {
        Ok(self
            .get_body_bytes(id)
            .await?
            .map(|b| String::from_utf8_lossy(&b).into_owned()))
    }
}

/// Source of successive body chunks.
///
/// `Ok(None)` (or an empty chunk) signals end of data; `Err` is a transient failure.
#[async_trait::async_trait]
pub trait ChunkLoader: Send + Sync {
    async fn load_next(&self) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_like_and_binary_kinds_are_disjoint() {
        let all = [
            ContentKind::Json,
            ContentKind::Xml,
            ContentKind::Html,
            ContentKind::FormData,
            ContentKind::Multipart,
            ContentKind::PlainText,
            ContentKind::Image,
            ContentKind::Pdf,
            ContentKind::UnknownBinary,
        ];
        for k in all {
            assert!(!(k.is_text_like() && k.is_binary_structured()), "{k}");
        }
        assert!(!ContentKind::UnknownBinary.is_text_like());
        assert_eq!(ContentKind::Pdf.export_hint(), ("pdf", "application/pdf"));
    }

    #[test]
    fn pdf_load_state_serializes_with_state_tag() {
        let st = PdfLoadState::Error {
            message: "boom".to_string(),
        };
        let v = serde_json::to_value(&st).unwrap();
        assert_eq!(v["state"], "error");
        assert_eq!(v["message"], "boom");
        assert!(st.is_terminal());
        assert!(!PdfLoadState::Loading.is_terminal());
    }

    #[test]
    fn segments_cover_text_and_overlay_wins() {
        let h = HighlightedText {
            text: Arc::from("abcdefgh"),
            spans: Arc::from(vec![StyleSpan {
                range: MatchRange::new(1, 5),
                style: StyleTag::AllMatches,
            }]),
            current: Some(StyleSpan {
                range: MatchRange::new(2, 4),
                style: StyleTag::CurrentMatch,
            }),
        };
        let segs = h.segments();
        let styles: Vec<_> = segs.iter().map(|s| (s.range.start, s.range.end, s.style)).collect();
        assert_eq!(
            styles,
            vec![
                (0, 1, None),
                (1, 2, Some(StyleTag::AllMatches)),
                (2, 4, Some(StyleTag::CurrentMatch)),
                (4, 5, Some(StyleTag::AllMatches)),
                (5, 8, None),
            ]
        );
        assert_eq!(HighlightedText::plain("").segments().len(), 0);
    }

    #[test]
    fn match_range_touching_is_detected() {
        let a = MatchRange::new(0, 3);
        assert!(a.overlaps_or_touches(&MatchRange::new(3, 5)));
        assert!(a.overlaps_or_touches(&MatchRange::new(1, 2)));
        assert!(!a.overlaps_or_touches(&MatchRange::new(4, 5)));
        assert_eq!(a.len(), 3);
    }
}
