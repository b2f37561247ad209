//! Render the pages around a viewport position to PNG files.
//!
//! # Usage
//!
//! ```bash
//! # Render the window around page 12 of a PDF at 150%
//! folio paper.pdf --page 12 --zoom 1.5 --out ./pages
//!
//! # Fit page 1 to a 1200x900 viewport
//! folio paper.pdf --fit width --container 1200x900
//!
//! # Exercise the engine without a PDF
//! folio --synthetic 200 --page 100
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use image::RgbImage;
use log::{error, info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};

use folio::panic_handler::initialize_panic_handler;
use folio::provider::PageInfoProvider;
use folio::synthetic::SyntheticDocument;
use folio::{ContainerSize, FitMode, PageView, PlaceholderStatus, Viewer, ViewerSettings};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Render the page window around a viewport position
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(version, about, long_about = None)]
struct Args {
    /// Document to open
    path: Option<PathBuf>,

    /// Use a generated document with this many letter-size pages instead of a file
    #[arg(long, value_name = "PAGES", conflicts_with = "path")]
    synthetic: Option<usize>,

    /// Page to scroll to (1-indexed)
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Zoom factor
    #[arg(long)]
    zoom: Option<f64>,

    /// Fit the page to the container: width, height or page
    #[arg(long, conflicts_with = "zoom")]
    fit: Option<FitMode>,

    /// Viewport size in pixels
    #[arg(long, value_name = "WxH", default_value = "1024x768", value_parser = parse_container)]
    container: ContainerSize,

    /// Write rendered window pages as PNG files into this directory
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up on pages still rendering after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn parse_container(s: &str) -> Result<ContainerSize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width: f64 = w.trim().parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let height: f64 = h.trim().parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("container must be positive, got '{s}'"));
    }
    Ok(ContainerSize::new(width, height))
}

fn open_provider(args: &Args) -> Result<Box<dyn PageInfoProvider>> {
    if let Some(pages) = args.synthetic {
        return Ok(Box::new(SyntheticDocument::uniform(pages, 612.0, 792.0)));
    }
    let Some(path) = args.path.as_deref() else {
        bail!("a document path or --synthetic is required");
    };
    open_file(path)
}

#[cfg(feature = "pdf")]
fn open_file(path: &Path) -> Result<Box<dyn PageInfoProvider>> {
    let document =
        folio::pdf::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(document))
}

#[cfg(not(feature = "pdf"))]
fn open_file(path: &Path) -> Result<Box<dyn PageInfoProvider>> {
    bail!(
        "{} cannot be opened: folio was built without the `pdf` feature",
        path.display()
    )
}

/// Every page in the committed window has a bitmap or has given up
fn window_settled(viewer: &Viewer) -> Result<bool> {
    for page in viewer.window().pages() {
        match viewer.get_rendered_page(page)? {
            PageView::Rendered(_) => {}
            PageView::Placeholder {
                status: PlaceholderStatus::Failed { .. },
                ..
            } => {}
            PageView::Placeholder { .. } => return Ok(false),
        }
    }
    Ok(true)
}

fn run(args: &Args) -> Result<()> {
    let settings = ViewerSettings::load_or_default(args.config.as_deref());
    let mut viewer = Viewer::new(settings);

    let provider = open_provider(args)?;
    let now = Instant::now();
    let page_count = viewer.open_document(provider, now)?;
    let page = args.page.clamp(1, page_count);
    if page != args.page {
        warn!("Page {} out of range, using {page}", args.page);
    }

    let zoom = args.zoom.unwrap_or_else(|| viewer.zoom());
    viewer.set_viewport(page, zoom, args.container, now)?;
    if let Some(mode) = args.fit {
        viewer.request_fit(mode, now)?;
    }
    viewer.scroll_to_page(page, now)?;

    let deadline = now + Duration::from_secs(args.timeout);
    loop {
        let now = Instant::now();
        let report = viewer.tick(now);
        for failed in &report.failed {
            warn!("Page {failed} failed to render");
        }
        if window_settled(&viewer)? {
            break;
        }
        if now >= deadline {
            warn!("Timed out waiting for {}", viewer.window());
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let stats = viewer.stats();
    println!(
        "{} pages, zoom {:.0}%, window {}, {} rendered, {} failed, {:.1} MiB retained, {} shared",
        stats.page_count,
        stats.zoom * 100.0,
        stats.window,
        stats.cache.rendered,
        stats.cache.failed,
        stats.cache.retained_bytes as f64 / (1024.0 * 1024.0),
        stats.shared_cached
    );

    if let Some(out) = args.out.as_deref() {
        write_pages(&viewer, out)?;
    }
    viewer.close();
    Ok(())
}

fn write_pages(viewer: &Viewer, out: &Path) -> Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    for page in viewer.window().pages() {
        let PageView::Rendered(rendered) = viewer.get_rendered_page(page)? else {
            continue;
        };
        let bitmap = &rendered.bitmap;
        let Some(image) =
            RgbImage::from_raw(bitmap.width_px, bitmap.height_px, bitmap.pixels.clone())
        else {
            warn!("Page {page} has a malformed bitmap, skipping");
            continue;
        };
        let file = out.join(format!("page_{page:04}.png"));
        image
            .save(&file)
            .with_context(|| format!("failed to write {}", file.display()))?;
        info!("Wrote {}", file.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(args.log_level, Config::default(), File::create("folio.log")?)?;
    initialize_panic_handler();

    info!("Starting folio");
    if let Err(err) = run(&args) {
        error!("Application error: {err:?}");
        return Err(err);
    }
    Ok(())
}
