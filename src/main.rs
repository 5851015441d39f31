use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use chipcount::{ChipCounter, ChipCounterConfig, DetectionResult, SegmentationBackend};

#[derive(Parser)]
#[command(name = "chipcount")]
#[command(about = "Count poker chips in photos and total their value")]
struct Cli {
    /// Paths to input image files
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,

    /// YOLOv8-seg model in .rten format (without it only circle detection runs)
    #[cfg(feature = "model")]
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// JSON configuration file (missing fields use defaults)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the detection confidence threshold
    #[arg(long, value_name = "FLOAT")]
    confidence: Option<f32>,

    /// Save per-stack debug images to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Pretty-print the JSON results
    #[arg(long)]
    pretty: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn primary_backend(args: &Cli) -> anyhow::Result<Box<dyn SegmentationBackend>> {
    #[cfg(feature = "model")]
    {
        if let Some(model_path) = &args.model {
            let backend = chipcount::YoloSegBackend::load(model_path, chipcount::YoloSegConfig::default())?;
            return Ok(Box::new(backend));
        }
    }
    let _ = args;
    Ok(Box::new(chipcount::PrecomputedBackend::empty()))
}

fn print_result(image: &Path, result: &DetectionResult, pretty: bool) -> anyhow::Result<()> {
    let json = serde_json::json!({
        "image": image.display().to_string(),
        "result": result,
    });
    if pretty {
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", serde_json::to_string(&json)?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => ChipCounterConfig::from_json_file(path)?,
        None => ChipCounterConfig::default(),
    };
    if let Some(confidence) = args.confidence {
        config = config.with_confidence_threshold(confidence);
    }

    let mut counter = ChipCounter::new(config, primary_backend(&args)?);
    if let Some(debug_dir) = &args.debug_out {
        counter = counter.with_debug(debug_dir.clone())?;
    }

    let mut input_failures = 0usize;
    for image in &args.images {
        let result = match counter.analyze_path(image) {
            Ok(analysis) => {
                for (i, stack) in analysis.stacks.iter().enumerate() {
                    debug!(
                        image = %image.display(),
                        stack = i + 1,
                        count = stack.count,
                        color = %stack.color,
                        denomination = stack.denomination,
                        "stack"
                    );
                }
                analysis.result
            }
            Err(e) if e.is_input_error() => {
                error!(image = %image.display(), error = %e, "skipping image");
                input_failures += 1;
                continue;
            }
            Err(e) => {
                // Backend trouble: report a zero result rather than failing the batch
                error!(image = %image.display(), error = %e, "chip detection failed");
                DetectionResult::no_detections(chipcount::PRIMARY_MODEL_LABEL)
            }
        };
        print_result(image, &result, args.pretty)?;
    }

    if input_failures > 0 {
        anyhow::bail!("{input_failures} image(s) could not be read");
    }
    Ok(())
}
