use anyhow::{Context, Result};
use backdrop::capture::WebcamCapture;
use backdrop::output::V4L2Output;
use backdrop::render::{FixedRateClock, RenderLoop, RenderOptions};
use backdrop::segmentation::Interpolation;
use backdrop::{BackgroundImage, BackgroundMode, CompositeConfig, SegmentationQuality, SharedConfig};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without segmentation
    #[arg(long)]
    model: Option<String>,

    /// Replacement background image
    #[arg(long)]
    background: Option<String>,

    /// What to do with the background
    #[arg(long, value_enum, default_value_t = BackgroundMode::Replace)]
    mode: BackgroundMode,

    /// Background blur strength (0-100)
    #[arg(long, default_value_t = 50)]
    blur_strength: u32,

    /// Edge feathering in percent (0-100)
    #[arg(long, default_value_t = 10.0)]
    edge_blending: f32,

    /// Mask tightness in percent (0-100)
    #[arg(long, default_value_t = 15.0)]
    mask_tightness: f32,

    /// Segmentation quality tier
    #[arg(long, value_enum, default_value_t = SegmentationQuality::Medium)]
    quality: SegmentationQuality,

    /// Show matte visualization (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_matte: bool,

    /// Upscale low-resolution masks bilinearly instead of nearest-neighbour
    #[arg(long)]
    bilinear_upscale: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Backdrop starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let config = CompositeConfig::from_percentages(
        args.mode,
        args.blur_strength,
        args.edge_blending,
        args.mask_tightness,
    );
    tracing::info!(
        "Mode: {:?}, blur={}, edge_blending={:.2}, tightness={:.2}",
        config.background_mode,
        config.blur_strength,
        config.edge_blending,
        config.mask_tightness
    );

    let capture = WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
        args.fps,
    )
    .context("Failed to initialize webcam capture")?;

    let output = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;

    let options = RenderOptions {
        show_matte: args.show_matte,
        interpolation: if args.bilinear_upscale {
            Interpolation::Bilinear
        } else {
            Interpolation::Nearest
        },
        ..RenderOptions::default()
    };
    let mut render = RenderLoop::new(capture, output, SharedConfig::new(config), options);

    if let Some(path) = &args.background {
        let background = BackgroundImage::open(path)
            .with_context(|| format!("Failed to load background image {}", path))?;
        render.set_background(Some(background));
    }

    if let Some(model_path) = &args.model {
        render = attach_oracle(render, model_path, args.quality)?;
    } else {
        tracing::info!("Running in passthrough mode (no segmentation)");
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("Failed to install Ctrl+C handler")?;
    }
    tracing::info!("Press Ctrl+C to stop");

    let mut clock = FixedRateClock::new(args.fps);
    let stats = render.run(&mut clock, &stop);

    tracing::info!(
        "Stopped after {} frames ({} composited, {} with a stale mask, {} failed)",
        stats.presented,
        stats.composited,
        stats.stale_masks,
        stats.failed_ticks
    );

    Ok(())
}

#[cfg(feature = "onnx")]
fn attach_oracle(
    render: RenderLoop<WebcamCapture, V4L2Output>,
    model_path: &str,
    quality: SegmentationQuality,
) -> Result<RenderLoop<WebcamCapture, V4L2Output>> {
    use backdrop::segmentation::{self, MaskChannel};

    tracing::info!("Loading segmentation model from {}", model_path);
    let oracle = segmentation::create_default_oracle(model_path, quality)
        .context("Failed to load segmentation model")?;
    tracing::info!("Segmentation model loaded successfully");

    let channel = MaskChannel::spawn(oracle, quality).context("Failed to start mask worker")?;
    Ok(render.with_mask_channel(channel))
}

#[cfg(not(feature = "onnx"))]
fn attach_oracle(
    _render: RenderLoop<WebcamCapture, V4L2Output>,
    model_path: &str,
    _quality: SegmentationQuality,
) -> Result<RenderLoop<WebcamCapture, V4L2Output>> {
    Err(backdrop::BackdropError::OracleUnavailable(format!(
        "cannot load {}: built without the `onnx` feature",
        model_path
    ))
    .into())
}
