//! colorcal CLI: find a color checker in a camera image and a reference
//! image, fit the camera → reference color transform and apply it.

use clap::Parser;
use colorcal::core::{big_checker, error_checker, parse_level, ColorGrid};
use colorcal::preprocess::preprocess;
use colorcal::{calibrate_with_canvases, CalibrateError, CalibrationCanvases, CalibrationParams};
use image::RgbImage;
use log::{info, LevelFilter};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliResult<T> = Result<T, CalibrateError>;

/// Rectified debug view resolution.
const RECTIFIED_PX_PER_SQUARE: f32 = 60.0;

#[derive(Debug, Parser)]
#[command(name = "colorcal")]
#[command(about = "Color calibration from a colorchecker in a camera image and a reference image")]
#[command(version)]
struct Cli {
    /// Camera image containing the color checker to calibrate.
    #[arg(long)]
    camera: PathBuf,

    /// Image of the same checker with reference colors.
    #[arg(long)]
    reference: PathBuf,

    /// Path to write the color-corrected camera image (full resolution).
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON calibration config (preprocessing and detector parameters).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for annotated canvases, patch swatches and the rectified view.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Path to write the full calibration result (JSON).
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug or trace.
    #[arg(long, default_value = "info", value_parser = parse_log_level)]
    #[cfg_attr(feature = "tracing", allow(dead_code))]
    log_level: LevelFilter,

    /// Emit tracing events as JSON lines.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    log_json: bool,
}

fn parse_log_level(s: &str) -> Result<LevelFilter, String> {
    parse_level(s).ok_or_else(|| format!("unknown log level '{s}'"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "tracing")]
    colorcal::core::init_tracing(cli.log_json);
    #[cfg(not(feature = "tracing"))]
    if let Err(err) = colorcal::core::init_with_level(cli.log_level) {
        eprintln!("failed to install logger: {err}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_rgb(path: &Path) -> CliResult<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

fn save(dir: &Path, name: &str, image: &RgbImage) -> CliResult<()> {
    image.save(dir.join(name))?;
    Ok(())
}

fn swatch(dir: &Path, name: &str, grid: &ColorGrid) -> CliResult<()> {
    save(dir, name, &big_checker(grid))
}

fn run(cli: &Cli) -> CliResult<()> {
    let params = match &cli.config {
        Some(path) => CalibrationParams::load_json(path)?,
        None => CalibrationParams::default(),
    };
    let camera = load_rgb(&cli.camera)?;
    let reference = load_rgb(&cli.reference)?;
    info!(
        "camera {}x{}, reference {}x{}",
        camera.width(),
        camera.height(),
        reference.width(),
        reference.height()
    );

    let mut canvases = CalibrationCanvases::default();
    let canvas_slot = if cli.debug_dir.is_some() {
        Some(&mut canvases)
    } else {
        None
    };
    let result = calibrate_with_canvases(&camera, &reference, &params, canvas_slot);

    if let Some(dir) = &cli.debug_dir {
        fs::create_dir_all(dir)?;
        save(dir, "camera_canvas.png", &canvases.camera)?;
        save(dir, "reference_canvas.png", &canvases.reference)?;
    }
    let calibration = result?;

    if let Some(dir) = &cli.debug_dir {
        swatch(dir, "camera_checker.png", &calibration.camera.colors)?;
        swatch(dir, "reference_checker.png", &calibration.reference.colors)?;
        swatch(dir, "adjusted_checker.png", &calibration.adjusted)?;
        if let Some(errors) = error_checker(&calibration.adjusted, &calibration.reference.colors) {
            swatch(dir, "error_checker.png", &errors)?;
        }
        let prepared = preprocess(&camera, &params.preprocess);
        if let Some(view) = calibration
            .camera
            .rectified_view(&prepared, RECTIFIED_PX_PER_SQUARE)
        {
            save(dir, "camera_rectified.png", &view)?;
        }
        info!("wrote debug images to {}", dir.display());
    }

    if let Some(path) = &cli.output {
        calibration.correct(&camera).save(path)?;
        info!("wrote corrected image to {}", path.display());
    }

    if let Some(path) = &cli.report {
        fs::write(path, serde_json::to_string_pretty(&calibration)?)?;
        info!("wrote report to {}", path.display());
    }

    let (before, after) = (calibration.report.before, calibration.report.after);
    println!(
        "before: L1 {:.3}  L2 {:.3}  MAD {:.1}",
        before.mean_absolute, before.rms, before.median_absolute
    );
    println!(
        "after:  L1 {:.3}  L2 {:.3}  MAD {:.1}",
        after.mean_absolute, after.rms, after.median_absolute
    );
    Ok(())
}
