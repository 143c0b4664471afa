use anyhow::{Context, Result};
use bodyscope_core::{BlobId, BlobStore, BodyRef, ContentKind, MatchRange};
use bodyscope_local::classify::{classify, multipart_boundary};
use bodyscope_local::config::{InspectorConfig, RendererMode};
use bodyscope_local::highlight::build_highlight;
use bodyscope_local::layout::match_regions;
use bodyscope_local::pretty::PrettyFormatter;
use bodyscope_local::render::PdfInspector;
use bodyscope_local::search::find_matches;
use bodyscope_local::shellout;
use bodyscope_local::store::content_id;
use bodyscope_local::{FsBlobStore, Inspector, MemoryBlobStore};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "bodyscope")]
#[command(about = "Inspect captured HTTP bodies (classify, metadata, search, pretty-print)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a body file (json).
    Classify(ClassifyCmd),
    /// Full inspection of a body: kind, first text page, image/PDF metadata (json).
    Inspect(InspectCmd),
    /// Copy a body file into the on-disk blob store (json).
    Ingest(IngestCmd),
    /// Case-insensitive search with highlight spans (json).
    Search(SearchCmd),
    /// Pretty-print a body for display (text).
    Pretty(PrettyCmd),
    /// Diagnose configuration and optional tools (json; no body data).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ClassifyCmd {
    /// Body file.
    path: PathBuf,
    /// Declared content-type (e.g. "application/json; charset=utf-8").
    #[arg(long)]
    content_type: Option<String>,
    /// Bytes of the body handed to the classifier.
    #[arg(long, env = "BODYSCOPE_SNIFF_BYTES", default_value_t = 4096)]
    sniff_bytes: usize,
}

#[derive(clap::Args, Debug)]
struct EngineArgs {
    /// Bytes per text page.
    #[arg(long, env = "BODYSCOPE_PAGE_SIZE")]
    page_size: Option<usize>,
    /// PDF pages to pre-render (1..=20).
    #[arg(long, env = "BODYSCOPE_PDF_MAX_PAGES")]
    pdf_max_pages: Option<usize>,
    /// PDF renderer: auto|pdftoppm|off
    #[arg(long, env = "BODYSCOPE_PDF_RENDERER")]
    pdf_renderer: Option<String>,
}

impl EngineArgs {
    fn config(&self) -> Result<InspectorConfig> {
        let mut cfg = InspectorConfig::from_env();
        if let Some(n) = self.page_size {
            cfg.page_size = n;
        }
        if let Some(n) = self.pdf_max_pages {
            cfg.pdf_max_pages = n;
        }
        if let Some(s) = &self.pdf_renderer {
            cfg.pdf_renderer = RendererMode::parse(s)
                .with_context(|| format!("unknown pdf renderer {s:?} (want auto|pdftoppm|off)"))?;
        }
        Ok(cfg.clamped())
    }
}

#[derive(clap::Args, Debug)]
struct InspectCmd {
    /// Body file (omit when using --id).
    path: Option<PathBuf>,
    #[arg(long)]
    content_type: Option<String>,
    /// Blob id in the store (see `ingest`).
    #[arg(long, conflicts_with = "path")]
    id: Option<String>,
    /// Blob store directory.
    #[arg(long, env = "BODYSCOPE_STORE_DIR")]
    store: Option<PathBuf>,
    /// Write rendered PDF pages as PNG files into this directory.
    #[arg(long)]
    thumbnails_dir: Option<PathBuf>,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(clap::Args, Debug)]
struct IngestCmd {
    path: PathBuf,
    #[arg(long)]
    content_type: Option<String>,
    /// Blob id (default: content hash).
    #[arg(long)]
    id: Option<String>,
    #[arg(long, env = "BODYSCOPE_STORE_DIR")]
    store: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    path: PathBuf,
    #[arg(long, short = 'q')]
    query: String,
    /// Index of the current match (wraps around).
    #[arg(long, default_value_t = 0)]
    current: usize,
    /// Soft-wrap width for line fragments (0 = no wrap).
    #[arg(long, default_value_t = 0)]
    wrap_columns: usize,
    /// Cap on matches listed in the output (the total is always reported).
    #[arg(long, default_value_t = 200)]
    max_matches: usize,
}

#[derive(clap::Args, Debug)]
struct PrettyCmd {
    path: PathBuf,
    #[arg(long)]
    content_type: Option<String>,
    #[arg(long, env = "BODYSCOPE_PRETTY_MAX_CHARS", default_value_t = 500_000)]
    max_chars: usize,
    #[arg(long, env = "BODYSCOPE_PRETTY_TRUNCATE_CHARS", default_value_t = 100_000)]
    truncate_chars: usize,
    /// Bytes of the body handed to the classifier.
    #[arg(long, env = "BODYSCOPE_SNIFF_BYTES", default_value_t = 4096)]
    sniff_bytes: usize,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    #[arg(long, env = "BODYSCOPE_STORE_DIR")]
    store: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bodyscope")
        .join("blobs")
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("BODYSCOPE_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_body(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Classify(args) => {
            let bytes = read_body(&args.path)?;
            let n = args.sniff_bytes.clamp(12, 1024 * 1024);
            let kind = classify(args.content_type.as_deref(), &bytes[..bytes.len().min(n)], None);
            let (ext, mime) = kind.export_hint();
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "classify",
                "ok": true,
                "content_kind": kind,
                "size": bytes.len(),
                "boundary": multipart_boundary(args.content_type.as_deref()).filter(|_| kind == ContentKind::Multipart),
                "export": { "extension": ext, "mime": mime },
            });
            println!("{v}");
        }
        Commands::Inspect(args) => {
            let cfg = args.engine.config()?;
            let (store, body): (Arc<dyn BlobStore>, BodyRef) = match (&args.path, &args.id) {
                (Some(path), _) => {
                    let bytes = read_body(path)?;
                    let mem = MemoryBlobStore::new();
                    let body = mem.insert(content_id(&bytes), args.content_type.as_deref(), bytes);
                    (Arc::new(mem) as Arc<dyn BlobStore>, body)
                }
                (None, Some(id)) => {
                    let fs = FsBlobStore::new(args.store.clone().unwrap_or_else(default_store_dir));
                    let id = BlobId::from(id.as_str());
                    let mut body = fs
                        .body_ref(&id)?
                        .unwrap_or_else(|| BodyRef::new(id.clone(), None, None));
                    if args.content_type.is_some() {
                        body.content_type = args.content_type.clone();
                    }
                    (Arc::new(fs) as Arc<dyn BlobStore>, body)
                }
                (None, None) => anyhow::bail!("inspect needs a file path or --id"),
            };
            let inspector = Inspector::with_pdf(store, cfg.clone(), PdfInspector::from_config(&cfg));
            tracing::debug!(
                id = %body.id,
                renderer = ?inspector.pdf().renderer_name(),
                page_size = cfg.page_size,
                "inspecting body"
            );
            let out = inspector.inspect(&body).await?;

            let mut written = Vec::new();
            if let (Some(dir), Some(pdf)) = (&args.thumbnails_dir, &out.pdf) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create {}", dir.display()))?;
                for page in &pdf.pages {
                    let p = dir.join(format!("page-{}.png", page.page_index + 1));
                    std::fs::write(&p, &page.png)
                        .with_context(|| format!("write {}", p.display()))?;
                    written.push(p.to_string_lossy().to_string());
                }
            }

            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "inspect",
                "ok": true,
                "renderer": inspector.pdf().renderer_name(),
                "result": out,
                "thumbnails_written": written,
            });
            println!("{v}");
        }
        Commands::Ingest(args) => {
            let bytes = read_body(&args.path)?;
            let root = args.store.unwrap_or_else(default_store_dir);
            let fs = FsBlobStore::new(root.clone());
            let id = args
                .id
                .map(BlobId::from)
                .unwrap_or_else(|| content_id(&bytes));
            let mut headers = BTreeMap::new();
            if let Some(ct) = &args.content_type {
                headers.insert("content-type".to_string(), ct.clone());
            }
            let body = fs.put(&id, args.content_type.as_deref(), &headers, &bytes)?;
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "ingest",
                "ok": true,
                "body": body,
                "store": root.to_string_lossy(),
            });
            println!("{v}");
        }
        Commands::Search(args) => {
            let bytes = read_body(&args.path)?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let q = args.query.clone();
            let (text, ranges) = tokio::task::spawn_blocking(move || {
                let r = find_matches(&text, &q);
                (text, r)
            })
            .await?;
            let current = (!ranges.is_empty()).then(|| args.current % ranges.len());
            let h = build_highlight(&text, &ranges, current);
            let current_range: Option<MatchRange> = h.current.map(|c| c.range);
            let fragments = current_range
                .map(|r| match_regions(&text, r, args.wrap_columns))
                .unwrap_or_default();
            let listed: Vec<serde_json::Value> = ranges
                .iter()
                .take(args.max_matches)
                .map(|r| {
                    serde_json::json!({
                        "start": r.start,
                        "end": r.end,
                        "text": &text[r.start..r.end],
                    })
                })
                .collect();
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "search",
                "ok": true,
                "query": args.query,
                "total": ranges.len(),
                "matches": listed,
                "highlight_spans": h.spans.len(),
                "current": current,
                "current_range": current_range,
                "current_fragments": fragments,
            });
            println!("{v}");
        }
        Commands::Pretty(args) => {
            let bytes = read_body(&args.path)?;
            let n = args.sniff_bytes.clamp(12, 1024 * 1024);
            let kind = classify(args.content_type.as_deref(), &bytes[..bytes.len().min(n)], None);
            if !kind.is_text_like() {
                anyhow::bail!("{} bodies have no text form", kind);
            }
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let f = PrettyFormatter::with_limits(args.max_chars, args.truncate_chars);
            let out = tokio::task::spawn_blocking(move || f.format(kind, &text)).await?;
            println!("{out}");
        }
        Commands::Doctor(args) => {
            let t0 = std::time::Instant::now();
            let cfg = InspectorConfig::from_env();
            let store_dir = args.store.unwrap_or_else(default_store_dir);

            let mut checks: Vec<serde_json::Value> = Vec::new();
            let store_ok = (|| -> anyhow::Result<()> {
                std::fs::create_dir_all(&store_dir)?;
                let probe = store_dir.join(format!(".bodyscope-doctor-{}", std::process::id()));
                std::fs::write(&probe, b"ok")?;
                std::fs::remove_file(&probe)?;
                Ok(())
            })();
            checks.push(serde_json::json!({
                "name": "store_dir_writable",
                "ok": store_ok.is_ok(),
                "skipped": false,
                "error": store_ok.err().map(|e| e.to_string()),
            }));
            let pdftoppm = shellout::has("pdftoppm");
            let renderer_wanted = cfg.pdf_renderer != RendererMode::Off;
            checks.push(serde_json::json!({
                "name": "pdftoppm_available",
                "ok": pdftoppm || !renderer_wanted,
                "skipped": !renderer_wanted,
                "error": serde_json::Value::Null,
            }));
            let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));

            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": ok,
                "name": "bodyscope",
                "version": env!("CARGO_PKG_VERSION"),
                "elapsed_ms": t0.elapsed().as_millis(),
                "config": cfg,
                "tools": { "pdftoppm": pdftoppm },
                "store_dir": store_dir.to_string_lossy(),
                "checks": checks,
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!("bodyscope {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
                    println!("store_dir: {}", store_dir.display());
                    println!("pdf_renderer: {:?} (pdftoppm={})", cfg.pdf_renderer, pdftoppm);
                    println!("checks:");
                    if let Some(arr) = payload["checks"].as_array() {
                        for c in arr {
                            let name = c["name"].as_str().unwrap_or("?");
                            let ok = c["ok"].as_bool().unwrap_or(false);
                            let skipped = c["skipped"].as_bool().unwrap_or(false);
                            if skipped {
                                println!("- {}: skipped", name);
                            } else {
                                println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                            }
                        }
                    }
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "bodyscope",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("bodyscope {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }
    Ok(())
}
