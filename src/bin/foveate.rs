use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "foveate", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pre-encode an input video into low/medium/high bitrate tiers (requires `ffmpeg`).
    Prepare(PrepareArgs),
    /// Composite the three tiers around predicted gaze and write segments (requires `ffmpeg`).
    Stream(StreamArgs),
    /// Print the nominal segment bitrate for a resolution.
    Bitrate(BitrateArgs),
}

#[derive(Parser, Debug)]
struct PrepareArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    width: u32,

    #[arg(long)]
    height: u32,

    /// Directory receiving low_res.mp4, med_res.mp4 and high_res.mp4.
    #[arg(long, default_value = "h264_outputs")]
    out_dir: PathBuf,

    /// Stream configuration JSON (tier bitrates).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct StreamArgs {
    /// Low tier video.
    #[arg(long)]
    low: PathBuf,

    /// Medium tier video.
    #[arg(long)]
    med: PathBuf,

    /// High tier video.
    #[arg(long)]
    high: PathBuf,

    /// Number of frames to process.
    #[arg(long)]
    frames: u64,

    #[arg(long)]
    width: u32,

    #[arg(long)]
    height: u32,

    /// Stream configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Segment output directory (overrides the config).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Gaze CSV log path (default: logs/gaze_prediction/gaze_<unix secs>.csv).
    #[arg(long)]
    gaze_log: Option<PathBuf>,

    /// Write the first composited frame as a PNG.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct BitrateArgs {
    #[arg(long)]
    width: u32,

    #[arg(long)]
    height: u32,

    /// Stream configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Prepare(args) => cmd_prepare(args),
        Command::Stream(args) => cmd_stream(args),
        Command::Bitrate(args) => cmd_bitrate(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<foveate::StreamConfig> {
    match path {
        Some(p) => foveate::StreamConfig::from_json_path(p)
            .with_context(|| format!("load config '{}'", p.display())),
        None => Ok(foveate::StreamConfig::default()),
    }
}

fn cmd_prepare(args: PrepareArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let canvas = foveate::Canvas::new(args.width, args.height)?;
    let files = foveate::encode_tiers(&args.in_path, canvas, &cfg.composite, &args.out_dir)?;

    eprintln!("wrote {}", files.low.display());
    eprintln!("wrote {}", files.med.display());
    eprintln!("wrote {}", files.high.display());
    Ok(())
}

fn cmd_stream(args: StreamArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(dir) = args.out_dir {
        cfg.segment.output_dir = dir;
    }
    let canvas = foveate::Canvas::new(args.width, args.height)?;
    let encoder = foveate::FfmpegSegmentEncoder::new(cfg.segment.bufsize.clone());

    let sources = foveate::TierSources::open_ffmpeg(&args.low, &args.med, &args.high, canvas)
        .context("open tier sources")?;

    let gaze_path = args.gaze_log.unwrap_or_else(foveate::GazeLog::default_path);
    let mut gaze_log = foveate::GazeLog::create(&gaze_path)?;

    let mut pipeline = foveate::Pipeline::new(cfg, canvas, encoder)?;
    if let Some(snapshot) = args.snapshot {
        pipeline = pipeline.with_snapshot(snapshot);
    }

    let mut progress = foveate::LogProgress::default();
    let report = pipeline.run(sources, args.frames, &mut gaze_log, &mut progress)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!("gaze log {}", gaze_log.path().display());
    Ok(())
}

fn cmd_bitrate(args: BitrateArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let compositor = foveate::RegionCompositor::new(cfg.composite);
    let bitrate = compositor.segment_bitrate(args.width, args.height)?;
    println!("{bitrate}");
    Ok(())
}
