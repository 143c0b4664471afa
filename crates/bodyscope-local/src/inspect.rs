//! End-to-end inspection of one stored body.

use crate::classify::{classify, multipart_boundary};
use crate::config::InspectorConfig;
use crate::metadata::extract_image_metadata;
use crate::paginate::{BlobChunkLoader, PaginatedLoader, PaginationSummary};
use crate::pretty::PrettyFormatter;
use crate::render::{PdfInspector, PdfPreview};
use bodyscope_core::{BlobStore, BodyRef, ContentKind, Error, ImageMetadata, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ExportHint {
    pub extension: &'static str,
    pub mime: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectedBody {
    pub body: BodyRef,
    /// False when the store has no body for this id.
    pub present: bool,
    pub kind: Option<ContentKind>,
    pub size: u64,
    pub boundary: Option<String>,
    pub export: Option<ExportHint>,
    /// First page of text (pretty-printed when the whole body fit).
    pub text: Option<String>,
    pub pretty: bool,
    pub pagination: Option<PaginationSummary>,
    pub image: Option<ImageMetadata>,
    pub pdf: Option<PdfPreview>,
}

impl InspectedBody {
    fn absent(body: BodyRef) -> Self {
        Self {
            body,
            present: false,
            kind: None,
            size: 0,
            boundary: None,
            export: None,
            text: None,
            pretty: false,
            pagination: None,
            image: None,
            pdf: None,
        }
    }
}

pub struct Inspector {
    store: Arc<dyn BlobStore>,
    config: InspectorConfig,
    pdf: PdfInspector,
    pretty: PrettyFormatter,
}

impl Inspector {
    pub fn new(store: Arc<dyn BlobStore>, config: InspectorConfig) -> Self {
        let config = config.clamped();
        let pdf = PdfInspector::from_config(&config);
        Self::with_pdf(store, config, pdf)
    }

    pub fn with_pdf(store: Arc<dyn BlobStore>, config: InspectorConfig, pdf: PdfInspector) -> Self {
        let config = config.clamped();
        Self {
            store,
            pretty: PrettyFormatter::from_config(&config),
            config,
            pdf,
        }
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    pub fn pdf(&self) -> &PdfInspector {
        &self.pdf
    }

    /// Kind of the stored body, or `None` when there is no body.
    pub async fn classify(&self, body: &BodyRef) -> Result<Option<ContentKind>> {
        let Some(bytes) = self.store.get_body_bytes(&body.id).await? else {
            return Ok(None);
        };
        let prefix = &bytes[..bytes.len().min(self.config.sniff_bytes)];
        Ok(Some(classify(body.content_type.as_deref(), prefix, None)))
    }

    /// A pagination loader over the body's text, primed with nothing loaded.
    pub async fn open_text(&self, body: &BodyRef) -> Result<Option<PaginatedLoader<BlobChunkLoader>>> {
        let Some(bytes) = self.store.get_body_bytes(&body.id).await? else {
            return Ok(None);
        };
        Ok(Some(self.text_loader(&bytes)))
    }

    fn text_loader(&self, bytes: &[u8]) -> PaginatedLoader<BlobChunkLoader> {
        let text: Arc<str> = Arc::from(String::from_utf8_lossy(bytes));
        let total = text.len() as u64;
        PaginatedLoader::new(
            BlobChunkLoader::new(text, self.config.page_size, 0),
            String::new(),
            Some(total),
        )
    }

    pub async fn inspect(&self, body: &BodyRef) -> Result<InspectedBody> {
        let Some(bytes) = self.store.get_body_bytes(&body.id).await? else {
            tracing::debug!(id = %body.id, "no body stored");
            return Ok(InspectedBody::absent(body.clone()));
        };
        if let Some(declared) = body.size {
            if declared != bytes.len() as u64 {
                tracing::debug!(id = %body.id, declared, actual = bytes.len(), "declared size differs");
            }
        }

        let prefix = &bytes[..bytes.len().min(self.config.sniff_bytes)];
        let kind = classify(body.content_type.as_deref(), prefix, None);
        let (extension, mime) = kind.export_hint();
        let mut out = InspectedBody {
            body: body.clone(),
            present: true,
            kind: Some(kind),
            size: bytes.len() as u64,
            boundary: None,
            export: Some(ExportHint { extension, mime }),
            text: None,
            pretty: false,
            pagination: None,
            image: None,
            pdf: None,
        };

        match kind {
            ContentKind::Image => {
                out.image = tokio::task::spawn_blocking(move || extract_image_metadata(&bytes))
                    .await
                    .map_err(|e| Error::Join(e.to_string()))?;
            }
            ContentKind::Pdf => {
                out.pdf = Some(self.pdf.load(Arc::from(bytes)).await);
            }
            ContentKind::UnknownBinary => {}
            _ => {
                if kind == ContentKind::Multipart {
                    out.boundary = multipart_boundary(body.content_type.as_deref());
                }
                let loader = self.text_loader(&bytes);
                loader.load_more().await;
                let first = loader.content();
                if loader.has_more() {
                    out.text = Some(first);
                } else {
                    let formatter = self.pretty;
                    let formatted =
                        tokio::task::spawn_blocking(move || formatter.format(kind, &first))
                            .await
                            .map_err(|e| Error::Join(e.to_string()))?;
                    out.pretty = kind == ContentKind::Json;
                    out.text = Some(formatted);
                }
                out.pagination = Some(loader.summary());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererMode;
    use crate::store::MemoryBlobStore;
    use crate::testing::build_pdf;
    use bodyscope_core::{BlobId, PdfLoadState};

    fn cfg() -> InspectorConfig {
        InspectorConfig {
            page_size: 1024,
            pdf_renderer: RendererMode::Off,
            ..InspectorConfig::default()
        }
    }

    fn inspector(store: Arc<MemoryBlobStore>) -> Inspector {
        Inspector::new(store, cfg())
    }

    #[tokio::test]
    async fn small_json_is_fully_loaded_and_pretty() {
        let store = Arc::new(MemoryBlobStore::new());
        let r = store.insert("j", Some("application/json; charset=utf-8"), br#"{"a":1}"#.to_vec());
        let out = inspector(store).inspect(&r).await.unwrap();
        assert_eq!(out.kind, Some(ContentKind::Json));
        assert_eq!(out.text.as_deref(), Some("{\n    \"a\": 1\n}"));
        assert!(out.pretty);
        let p = out.pagination.unwrap();
        assert!(!p.has_more);
        assert_eq!(p.loaded_bytes, 7);
    }

    #[tokio::test]
    async fn large_text_stays_paginated_and_raw() {
        let store = Arc::new(MemoryBlobStore::new());
        let body = format!("[{}]", vec!["1"; 1000].join(","));
        let r = store.insert("big", Some("application/json"), body.clone().into_bytes());
        let out = inspector(store).inspect(&r).await.unwrap();
        let text = out.text.unwrap();
        assert_eq!(text.len(), 1024);
        assert!(body.starts_with(&text));
        assert!(!out.pretty);
        assert!(out.pagination.unwrap().has_more);
    }

    #[tokio::test]
    async fn missing_body_is_reported_absent() {
        let store = Arc::new(MemoryBlobStore::new());
        let r = BodyRef::new(BlobId::from("ghost"), Some("text/plain"), None);
        let out = inspector(store).inspect(&r).await.unwrap();
        assert!(!out.present);
        assert!(out.kind.is_none());
    }

    #[tokio::test]
    async fn pdf_magic_beats_declared_type() {
        let store = Arc::new(MemoryBlobStore::new());
        let r = store.insert("p", Some("text/plain"), build_pdf(2, Some("Doc")));
        let out = inspector(store).inspect(&r).await.unwrap();
        assert_eq!(out.kind, Some(ContentKind::Pdf));
        assert!(out.text.is_none());
        match out.pdf.map(|p| p.state) {
            Some(PdfLoadState::Success { metadata, .. }) => {
                assert_eq!(metadata.page_count, 2);
                assert_eq!(metadata.title.as_deref(), Some("Doc"));
            }
            other => panic!("unexpected pdf state {other:?}"),
        }
    }

    #[tokio::test]
    async fn multipart_reports_boundary() {
        let store = Arc::new(MemoryBlobStore::new());
        let r = store.insert(
            "m",
            Some("multipart/form-data; boundary=\"XyZ\""),
            b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--XyZ--".to_vec(),
        );
        let out = inspector(store).inspect(&r).await.unwrap();
        assert_eq!(out.kind, Some(ContentKind::Multipart));
        assert_eq!(out.boundary.as_deref(), Some("XyZ"));
        assert!(!out.pretty);
    }

    #[tokio::test]
    async fn open_text_pages_through_whole_body() {
        let store = Arc::new(MemoryBlobStore::new());
        let body = "é".repeat(1500);
        let r = store.insert("t", Some("text/plain"), body.clone().into_bytes());
        let loader = inspector(store).open_text(&r).await.unwrap().unwrap();
        while loader.has_more() {
            loader.load_more().await;
        }
        assert_eq!(loader.content(), body);
    }
}
