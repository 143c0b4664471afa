//! Engine knobs, with `BODYSCOPE_*` environment overrides.
//!
//! Every value is clamped on read so a bad env var degrades to a bounded setting instead of an
//! unbounded one.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 256 * 1024;
pub const DEFAULT_SNIFF_BYTES: usize = 4096;
pub const DEFAULT_PRETTY_MAX_CHARS: usize = 500_000;
pub const DEFAULT_PRETTY_TRUNCATE_CHARS: usize = 100_000;
/// Hard cap on pre-rendered PDF pages.
pub const MAX_PDF_PAGES: usize = 20;
pub const DEFAULT_PDF_RENDER_PARALLELISM: usize = 2;
pub const DEFAULT_PDF_RENDER_SCALE: f32 = 2.0;
pub const DEFAULT_PDF_RENDER_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererMode {
    /// Use `pdftoppm` when it is on PATH, otherwise skip thumbnails.
    Auto,
    Pdftoppm,
    Off,
}

impl RendererMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(RendererMode::Auto),
            "pdftoppm" => Some(RendererMode::Pdftoppm),
            "off" | "none" | "0" => Some(RendererMode::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectorConfig {
    /// Bytes per pagination chunk.
    pub page_size: usize,
    /// Bytes of the body prefix handed to the classifier.
    pub sniff_bytes: usize,
    /// Above this many chars, JSON is not reformatted.
    pub pretty_max_chars: usize,
    /// Chars kept when the pretty-print ceiling is hit.
    pub pretty_truncate_chars: usize,
    /// Pages to pre-render for PDF thumbnails (1 = first page only).
    pub pdf_max_pages: usize,
    pub pdf_render_parallelism: usize,
    /// Oversampling factor applied to the 72 dpi page size.
    pub pdf_render_scale: f32,
    pub pdf_renderer: RendererMode,
    /// Per-page wall clock limit for the external renderer.
    pub pdf_render_timeout_ms: u64,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            sniff_bytes: DEFAULT_SNIFF_BYTES,
            pretty_max_chars: DEFAULT_PRETTY_MAX_CHARS,
            pretty_truncate_chars: DEFAULT_PRETTY_TRUNCATE_CHARS,
            pdf_max_pages: 1,
            pdf_render_parallelism: DEFAULT_PDF_RENDER_PARALLELISM,
            pdf_render_scale: DEFAULT_PDF_RENDER_SCALE,
            pdf_renderer: RendererMode::Auto,
            pdf_render_timeout_ms: DEFAULT_PDF_RENDER_TIMEOUT_MS,
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    env(key)
        .and_then(|s| s.parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

impl InspectorConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            page_size: env_usize("BODYSCOPE_PAGE_SIZE", d.page_size),
            sniff_bytes: env_usize("BODYSCOPE_SNIFF_BYTES", d.sniff_bytes),
            pretty_max_chars: env_usize("BODYSCOPE_PRETTY_MAX_CHARS", d.pretty_max_chars),
            pretty_truncate_chars: env_usize(
                "BODYSCOPE_PRETTY_TRUNCATE_CHARS",
                d.pretty_truncate_chars,
            ),
            pdf_max_pages: env_usize("BODYSCOPE_PDF_MAX_PAGES", d.pdf_max_pages),
            pdf_render_parallelism: env_usize(
                "BODYSCOPE_PDF_RENDER_PARALLELISM",
                d.pdf_render_parallelism,
            ),
            pdf_render_scale: env_f32("BODYSCOPE_PDF_RENDER_SCALE", d.pdf_render_scale),
            pdf_renderer: env("BODYSCOPE_PDF_RENDERER")
                .and_then(|s| RendererMode::parse(&s))
                .unwrap_or(d.pdf_renderer),
            pdf_render_timeout_ms: env("BODYSCOPE_PDF_RENDER_TIMEOUT_MS")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(d.pdf_render_timeout_ms),
        }
        .clamped()
    }

    /// Bring every knob into its supported range.
    pub fn clamped(mut self) -> Self {
        self.page_size = self.page_size.clamp(1024, 64 * 1024 * 1024);
        // Magic-byte checks need at least 12 bytes.
        self.sniff_bytes = self.sniff_bytes.clamp(12, 1024 * 1024);
        self.pretty_max_chars = self.pretty_max_chars.max(1);
        self.pretty_truncate_chars = self.pretty_truncate_chars.min(self.pretty_max_chars);
        self.pdf_max_pages = self.pdf_max_pages.clamp(1, MAX_PDF_PAGES);
        self.pdf_render_parallelism = self.pdf_render_parallelism.clamp(1, 8);
        self.pdf_render_scale = self.pdf_render_scale.clamp(0.25, 8.0);
        self.pdf_render_timeout_ms = self.pdf_render_timeout_ms.clamp(50, 300_000);
        self
    }
}
