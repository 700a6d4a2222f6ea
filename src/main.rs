use clap::Parser;
use image::ImageReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clockscore::store::{PersistedScore, ScoreSink};
use clockscore::{JsonLinesScoreSink, Pipeline, RtenDigitModel, ScoringConfig};

#[derive(Parser)]
#[command(name = "clockscore")]
#[command(about = "Score clock drawing test images")]
struct Cli {
    /// Paths to input image files
    #[arg(value_name = "IMAGE", required = true)]
    image_paths: Vec<PathBuf>,

    /// Digit classifier model (defaults to ~/.cache/clockscore/digits.rten)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// JSON file overriding scoring thresholds
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Write an annotated copy of the drawing (single image only)
    #[arg(long, value_name = "PATH")]
    annotate: Option<PathBuf>,

    /// Print the measured features as JSON
    #[arg(long)]
    features: bool,

    /// Subtest the score belongs to; requires --scores-out
    #[arg(long, requires = "scores_out")]
    subtest_id: Option<i64>,

    /// JSON-lines file scores are appended to
    #[arg(long, value_name = "PATH", requires = "subtest_id")]
    scores_out: Option<PathBuf>,

    /// Worker threads for multiple images
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => ScoringConfig::from_json_file(path)?,
        None => ScoringConfig::default(),
    };
    let model_path = match args.model {
        Some(path) => path,
        None => RtenDigitModel::default_path()?,
    };
    info!("Loading digit model: {}", model_path.display());
    let model = RtenDigitModel::load(&model_path, config.digits.layout)?;

    let mut pipeline = Pipeline::new(Arc::new(model)).with_config(config)?;
    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    if args.annotate.is_some() && args.image_paths.len() != 1 {
        anyhow::bail!("--annotate takes exactly one input image");
    }
    if args.subtest_id.is_some() && args.image_paths.len() != 1 {
        anyhow::bail!("--subtest-id takes exactly one input image");
    }

    let mut images = Vec::with_capacity(args.image_paths.len());
    for path in &args.image_paths {
        let img = ImageReader::open(path)?
            .decode()
            .map_err(|e| anyhow::anyhow!("Failed to decode image {}: {}", path.display(), e))?;
        info!("Image loaded: {} ({}x{})", path.display(), img.width(), img.height());
        images.push(img);
    }

    let outcomes = match &args.annotate {
        Some(annotate_path) => {
            let analysis = pipeline.analyze(&images[0])?;
            clockscore::annotate::render(&images[0], &analysis).save(annotate_path)?;
            info!("Annotated image written to {}", annotate_path.display());
            vec![Ok(pipeline.score_analysis(analysis))]
        }
        None => pipeline.run_batch(&images, args.workers),
    };

    let mut failures = 0;
    for (path, outcome) in args.image_paths.iter().zip(outcomes) {
        match outcome {
            Ok(outcome) => {
                println!("{}: {}", path.display(), serde_json::to_string(&outcome.score)?);
                if args.features {
                    println!("{}", serde_json::to_string_pretty(&outcome.features)?);
                }
                if let (Some(subtest_id), Some(scores_out)) = (args.subtest_id, &args.scores_out) {
                    let sink = JsonLinesScoreSink::new(scores_out);
                    sink.persist_score(&PersistedScore::new(subtest_id, &outcome.score))?;
                    info!("Score for subtest {} appended to {}", subtest_id, scores_out.display());
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} images could not be scored", failures, args.image_paths.len());
    }
    Ok(())
}
