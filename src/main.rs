use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use tracing::info;

use tess_bridge::engine::tesseract::TesseractEngine;
use tess_bridge::{EngineMode, NativeHandle, PageSegMode, ProgressListener, ProgressUpdate};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Hocr,
    Box,
}

#[derive(Parser, Debug)]
#[command(
    name = "tess-bridge",
    version,
    about = "Recognize text in an image with cancelable progress reporting"
)]
struct Cli {
    /// Image to recognize (png, jpeg, tiff, bmp, ...)
    image: Option<PathBuf>,

    /// Directory holding *.traineddata files (overrides settings)
    #[arg(long = "datapath")]
    datapath: Option<String>,

    /// Recognition language(s), e.g. eng or eng+jpn (overrides settings)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Engine mode: 0 legacy, 1 LSTM, 2 both, 3 default
    #[arg(long = "oem")]
    oem: Option<i32>,

    /// Page segmentation mode (0-13)
    #[arg(long = "psm")]
    psm: Option<i32>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "text")]
    format: Format,

    /// Page number used by hocr/box output
    #[arg(long = "page", default_value_t = 0)]
    page: i32,

    /// Stop recognition after this many milliseconds
    #[arg(long = "stop-after-ms")]
    stop_after_ms: Option<u64>,

    /// Print mean and per-word confidences after the output
    #[arg(long = "confidences")]
    confidences: bool,

    /// Hide progress on stderr
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<PathBuf>,

    /// Write the default settings to a file and exit
    #[arg(long = "init-settings")]
    init_settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

struct StderrProgress;

impl ProgressListener for StderrProgress {
    fn on_progress_values(&self, update: ProgressUpdate) {
        if update.has_region() {
            eprintln!(
                "progress: {:>3}% word [{}, {}, {}, {}]",
                update.percent, update.left, update.top, update.right, update.bottom
            );
        } else {
            eprintln!("progress: {:>3}%", update.percent);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tess_bridge::logging::init(cli.verbose);

    if let Some(path) = cli.init_settings.as_deref() {
        if tess_bridge::settings::write_default_settings(path)? {
            println!("wrote {}", path.display());
        } else {
            println!("{} already exists", path.display());
        }
        return Ok(());
    }

    let image_path = cli
        .image
        .clone()
        .ok_or_else(|| anyhow!("an image path is required"))?;

    let mut settings = tess_bridge::load_settings(cli.read_settings.as_deref())?;
    if let Some(datapath) = cli.datapath.clone() {
        settings.datapath = Some(datapath);
    }
    if let Some(lang) = cli.lang.clone() {
        settings.language = lang;
    }
    if let Some(oem) = cli.oem {
        settings.engine_mode =
            EngineMode::try_from(oem).map_err(|value| anyhow!("invalid --oem value: {value}"))?;
    }
    if let Some(psm) = cli.psm {
        settings.page_seg_mode = Some(
            PageSegMode::try_from(psm).map_err(|value| anyhow!("invalid --psm value: {value}"))?,
        );
    }

    let engine = TesseractEngine::new().ok_or_else(|| anyhow!("failed to create tesseract"))?;
    let handle = NativeHandle::new(engine);
    handle.configure(&settings)?;
    load_image(&handle, &image_path)?;

    if let Some(ms) = cli.stop_after_ms {
        let stop = handle.stop_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(ms));
            info!("cli: stopping after {ms} ms");
            stop.stop();
        });
    }

    let listener: Arc<dyn ProgressListener> = if cli.quiet {
        Arc::new(|_: ProgressUpdate| {})
    } else {
        Arc::new(StderrProgress)
    };
    let output = match cli.format {
        Format::Text => handle.utf8_text(listener)?,
        Format::Hocr => handle.hocr_text(cli.page, listener)?,
        Format::Box => handle.box_text(cli.page)?,
    };
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }

    if cli.confidences {
        match handle.mean_confidence() {
            Some(mean) => println!("mean confidence: {mean}"),
            None => println!("mean confidence: unavailable"),
        }
        let words = handle
            .word_confidences()
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>();
        println!("word confidences: {}", words.join(" "));
    }
    Ok(())
}

fn load_image(handle: &NativeHandle, path: &Path) -> Result<()> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to decode image: {}", path.display()))?
        .to_luma8();
    let (width, height) = decoded.dimensions();
    let width = i32::try_from(width).context("image is too wide")?;
    let height = i32::try_from(height).context("image is too tall")?;
    info!("cli: loaded {} ({width}x{height})", path.display());
    handle.set_image_bytes(decoded.as_raw(), width, height, 1, width)?;
    Ok(())
}
