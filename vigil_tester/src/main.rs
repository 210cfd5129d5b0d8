use anyhow::{Context, Result, bail};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vigil_vision::{
    DetectionMode, Frame, MotionPipeline, MotionReport, PipelineConfig, ZoneParallelPipeline,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: vigil_tester <config.toml> <image>...");
        println!("  static_reference mode: the first image is the reference, the rest are analysed");
        println!("  adaptive mode: every image is analysed in order");
        return Ok(());
    }
    let config_path = PathBuf::from(&args[1]);
    let image_paths: Vec<PathBuf> = args[2..].iter().map(PathBuf::from).collect();

    // --- 2. Configuration ---
    let text = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;
    let config = PipelineConfig::from_toml_str(&text)
        .with_context(|| format!("invalid config {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        config = %config_path.display(),
        mode = %config.mode,
        zones = config.zones.len(),
        images = image_paths.len(),
        "Starting"
    );

    // --- 3. Pipeline Initialization & Processing Loop ---
    let mut motion_frames = 0usize;
    match config.mode {
        DetectionMode::StaticReference => {
            let Some((reference_path, frame_paths)) = image_paths.split_first() else {
                bail!("static_reference mode needs a reference image");
            };
            let reference = load_frame(reference_path)?;
            let mut pipeline = ZoneParallelPipeline::new(config, &reference)?;
            for path in frame_paths {
                let frame = load_frame(path)?;
                let report = pipeline.process(&frame).await?;
                motion_frames += log_report(path, &report);
            }
        }
        DetectionMode::Adaptive => {
            let mut pipeline = MotionPipeline::adaptive(config)?;
            for path in &image_paths {
                let frame = load_frame(path)?;
                let report = pipeline.process(&frame)?;
                motion_frames += log_report(path, &report);
            }
        }
    }

    info!(motion_frames, "Processing complete");
    Ok(())
}

/// Decodes any format the `image` crate understands into an RGB frame.
fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgb8();
    Ok(Frame::from(image))
}

/// Logs one report; returns 1 when it detected motion.
fn log_report(path: &Path, report: &MotionReport) -> usize {
    if !report.is_motion() {
        info!(frame = report.frame_index, image = %path.display(), status = %report.status, warming_up = report.warming_up);
        return 0;
    }
    for event in report.events() {
        warn!(
            frame = report.frame_index,
            image = %path.display(),
            scope = %event.scope,
            bbox = %event.bounding_box,
            area = event.area,
            "Motion"
        );
    }
    1
}
