use anyhow::{Context, Result};
use cardscan_core::BoardLayout;
use cardscan_cv::detection::CancellationToken;
use cardscan_cv::utils::ImageUtils;
use cardscan_cv::{ArtifactRegistry, BoardFrame, CascadeDetector, DetectionConfig, TemplateLoader};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod report;

use report::BoardReport;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    UnevenLighting,
    EdgeMatching,
    LowLatency,
}

#[derive(Parser, Debug)]
#[command(name = "cardscan")]
#[command(about = "Detect cards, jokers and icons in a game screen capture")]
#[command(version)]
struct Cli {
    /// Screen capture to analyze
    image: PathBuf,

    /// Reference library directory; repeat for several
    #[arg(long, required = true)]
    library: Vec<PathBuf>,

    /// JSON detection config; overrides --preset
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    /// Write the report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Board rectangle inside the capture as x,y,width,height
    #[arg(long, value_parser = parse_rect)]
    board_frame: Option<[f64; 4]>,
}

fn parse_rect(value: &str) -> std::result::Result<[f64; 4], String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid number in '{}': {}", value, e))?;
    match parts.as_slice() {
        &[x, y, w, h] if w > 0.0 && h > 0.0 => Ok([x, y, w, h]),
        [_, _, _, _] => Err("board width and height must be positive".to_string()),
        _ => Err(format!("expected x,y,width,height, got '{}'", value)),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DetectionConfig::load(path)?,
        None => match cli.preset {
            Preset::Default => DetectionConfig::default(),
            Preset::UnevenLighting => DetectionConfig::for_uneven_lighting(),
            Preset::EdgeMatching => DetectionConfig::edge_matching(),
            Preset::LowLatency => DetectionConfig::low_latency(),
        },
    };

    let image = ImageUtils::load_rgb(&cli.image)?;
    let (board_width, board_height) = match cli.board_frame {
        Some([x, y, w, h]) => {
            config.board_frame = BoardFrame::from_capture_rect(x, y, w, h, w, h);
            (w, h)
        }
        None => (
            image.width() as f64 * config.board_frame.scale_x,
            image.height() as f64 * config.board_frame.scale_y,
        ),
    };

    let loader = cli
        .library
        .iter()
        .fold(TemplateLoader::new(), |loader, dir| loader.add_template_dir(dir));
    let library = loader.load_library(&config.template)?;
    if library.is_empty() {
        tracing::warn!("reference library is empty, only the primary tier can match");
    }

    // No inference runtime is linked into the CLI; the cascade runs on the
    // template and heuristic tiers until an artifact is installed.
    let registry = Arc::new(ArtifactRegistry::new(Arc::new(library)));
    let detector = CascadeDetector::new(config, registry)?;

    let outcome = detector
        .detect_with_stats(&image, &CancellationToken::new())
        .with_context(|| format!("Detection failed on {:?}", cli.image))?;
    let report = BoardReport::build(outcome, &BoardLayout::default(), board_width, board_height);

    print!("{}", report);

    if let Some(path) = &cli.json {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("Failed to write report: {:?}", path))?;
        tracing::info!("wrote report to {:?}", path);
    }

    Ok(())
}
