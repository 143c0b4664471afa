//! PDF page thumbnails.
//!
//! Rendering goes through the [`PageRenderer`] seam. A renderer opens one [`RenderSession`] per
//! document; the session owns whatever the renderer needs (temp files, handles) and releases it
//! when dropped, so every exit path, including a dropped future, cleans up.
//!
//! Only the first `pdf_max_pages` pages are rendered (capped at
//! [`crate::config::MAX_PDF_PAGES`]), at most `pdf_render_parallelism` at a time. A page that
//! fails to render is reported on its own and does not affect the others.

use crate::config::{InspectorConfig, RendererMode};
use crate::pdf::extract_pdf_metadata;
use crate::shellout;
use bodyscope_core::{Error, PageThumbnail, PdfLoadState, Result};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

pub trait PageRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare `pdf` for rendering. Blocking.
    fn open(&self, pdf: &[u8]) -> Result<Box<dyn RenderSession>>;
}

pub trait RenderSession: Send + Sync {
    /// Render one zero-based page at `scale` x 72 dpi. Blocking.
    fn render_page(&self, page_index: u32, scale: f32) -> Result<PageThumbnail>;
}

/// Renders pages by shelling out to poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    bin: PathBuf,
    timeout: Duration,
}

impl PdftoppmRenderer {
    pub fn detect(timeout: Duration) -> Option<Self> {
        let bin = shellout::which("pdftoppm")?;
        Some(Self { bin, timeout })
    }
}

struct PdftoppmSession {
    // Holds doc.pdf and the rendered pages; removed on drop.
    dir: tempfile::TempDir,
    doc: PathBuf,
    bin: PathBuf,
    timeout: Duration,
}

impl PageRenderer for PdftoppmRenderer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    fn open(&self, pdf: &[u8]) -> Result<Box<dyn RenderSession>> {
        let dir = tempfile::Builder::new()
            .prefix("bodyscope-")
            .tempdir()
            .map_err(|e| Error::Render(format!("tempdir: {e}")))?;
        let doc = dir.path().join("doc.pdf");
        std::fs::write(&doc, pdf).map_err(|e| Error::Render(format!("write pdf: {e}")))?;
        Ok(Box::new(PdftoppmSession {
            dir,
            doc,
            bin: self.bin.clone(),
            timeout: self.timeout,
        }))
    }
}

impl RenderSession for PdftoppmSession {
    fn render_page(&self, page_index: u32, scale: f32) -> Result<PageThumbnail> {
        let page_no = (page_index + 1).to_string();
        let dpi = ((72.0 * scale).round() as u32).max(1).to_string();
        let prefix = self.dir.path().join(format!("page-{page_no}"));
        let mut cmd = Command::new(&self.bin);
        cmd.args(["-png", "-singlefile", "-f", &page_no, "-l", &page_no, "-r", &dpi])
            .arg(&self.doc)
            .arg(&prefix);
        shellout::run_bounded(cmd, self.timeout).map_err(|e| Error::Render(e.to_string()))?;

        let out = prefix.with_extension("png");
        let png = std::fs::read(&out).map_err(|e| Error::Render(format!("read page: {e}")))?;
        let _ = std::fs::remove_file(&out);
        let (width, height) = image::ImageReader::new(Cursor::new(&png))
            .with_guessed_format()
            .map_err(|e| Error::Render(e.to_string()))?
            .into_dimensions()
            .map_err(|e| Error::Render(e.to_string()))?;
        Ok(PageThumbnail {
            page_index,
            width,
            height,
            png,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageError {
    pub page_index: u32,
    pub message: String,
}

/// Terminal PDF state plus every page that was pre-rendered.
#[derive(Debug, Clone, Serialize)]
pub struct PdfPreview {
    pub state: PdfLoadState,
    pub pages: Vec<PageThumbnail>,
    pub page_errors: Vec<PageError>,
}

impl PdfPreview {
    fn without_pages(state: PdfLoadState) -> Self {
        Self {
            state,
            pages: Vec::new(),
            page_errors: Vec::new(),
        }
    }
}

/// Render `pages` through `session`, at most `parallelism` at a time, in page order.
pub async fn render_pages(
    session: Arc<dyn RenderSession>,
    pages: Vec<u32>,
    scale: f32,
    parallelism: usize,
) -> Vec<(u32, Result<PageThumbnail>)> {
    stream::iter(pages)
        .map(|page| {
            let session = Arc::clone(&session);
            async move {
                let res = tokio::task::spawn_blocking(move || session.render_page(page, scale))
                    .await
                    .map_err(|e| Error::Join(e.to_string()))
                    .and_then(|r| r);
                (page, res)
            }
        })
        .buffered(parallelism.max(1))
        .collect()
        .await
}

/// PDF metadata + thumbnails for one document.
#[derive(Clone)]
pub struct PdfInspector {
    renderer: Option<Arc<dyn PageRenderer>>,
    max_pages: usize,
    parallelism: usize,
    scale: f32,
}

impl PdfInspector {
    pub fn new(renderer: Option<Arc<dyn PageRenderer>>, cfg: &InspectorConfig) -> Self {
        let cfg = cfg.clone().clamped();
        Self {
            renderer,
            max_pages: cfg.pdf_max_pages,
            parallelism: cfg.pdf_render_parallelism,
            scale: cfg.pdf_render_scale,
        }
    }

    /// Pick the renderer named by `cfg.pdf_renderer`.
    pub fn from_config(cfg: &InspectorConfig) -> Self {
        let timeout = Duration::from_millis(cfg.pdf_render_timeout_ms);
        let renderer: Option<Arc<dyn PageRenderer>> = match cfg.pdf_renderer {
            RendererMode::Off => None,
            RendererMode::Auto | RendererMode::Pdftoppm => {
                let found = PdftoppmRenderer::detect(timeout);
                if found.is_none() && cfg.pdf_renderer == RendererMode::Pdftoppm {
                    tracing::warn!("pdftoppm requested but not found on PATH; thumbnails disabled");
                }
                found.map(|r| Arc::new(r) as Arc<dyn PageRenderer>)
            }
        };
        Self::new(renderer, cfg)
    }

    pub fn renderer_name(&self) -> Option<&'static str> {
        self.renderer.as_ref().map(|r| r.name())
    }

    /// Read metadata, then pre-render the first pages.
    ///
    /// Metadata failures are terminal states, never errors. Thumbnails are only attempted for a
    /// successfully opened document with at least one page.
    pub async fn load(&self, bytes: Arc<[u8]>) -> PdfPreview {
        let b = Arc::clone(&bytes);
        let state = match tokio::task::spawn_blocking(move || extract_pdf_metadata(&b)).await {
            Ok(st) => st,
            Err(e) => PdfLoadState::Error {
                message: format!("pdf metadata task failed: {e}"),
            },
        };
        let metadata = match state {
            PdfLoadState::Success { metadata, .. } => metadata,
            other => return PdfPreview::without_pages(other),
        };
        let count = (metadata.page_count as usize).min(self.max_pages);
        let Some(renderer) = self.renderer.clone().filter(|_| count > 0) else {
            return PdfPreview::without_pages(PdfLoadState::Success {
                thumbnail: None,
                metadata,
            });
        };

        let mut pages = Vec::new();
        let mut page_errors = Vec::new();
        let opened = tokio::task::spawn_blocking(move || renderer.open(&bytes))
            .await
            .map_err(|e| Error::Join(e.to_string()))
            .and_then(|r| r);
        match opened {
            Ok(session) => {
                let session: Arc<dyn RenderSession> = Arc::from(session);
                let wanted: Vec<u32> = (0..count as u32).collect();
                for (page_index, res) in
                    render_pages(session, wanted, self.scale, self.parallelism).await
                {
                    match res {
                        Ok(t) => pages.push(t),
                        Err(e) => {
                            tracing::warn!(page_index, error = %e, "pdf page render failed");
                            page_errors.push(PageError {
                                page_index,
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "pdf render session failed to open");
                page_errors.push(PageError {
                    page_index: 0,
                    message: e.to_string(),
                });
            }
        }

        let thumbnail = pages.iter().find(|p| p.page_index == 0).cloned();
        PdfPreview {
            state: PdfLoadState::Success {
                thumbnail,
                metadata,
            },
            pages,
            page_errors,
        }
    }
}
