mod config;
mod display;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use display::{FrameDisplay, HeadlessDisplay, WindowDisplay};
use rollcall_core::{load_roster, OnnxFaceEncoder, ReferenceIdentity};
use rollcall_hw::{Backoff, Camera, FrameSource, HttpSnapshotSource};
use rollcall_store::{filter_rows, AttendanceLog, AttendanceReport};
use session::{LoopSettings, Session, SessionLoop, StopReason};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Classroom attendance by face recognition")]
struct Cli {
    /// TOML configuration file (also ROLLCALL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of reference images named <roll>_<prn>_<first>_<last>_<division>.jpg
    #[arg(long, global = true)]
    reference_dir: Option<PathBuf>,

    /// Attendance CSV to append to
    #[arg(long, global = true)]
    attendance_file: Option<PathBuf>,

    /// Classroom label recorded with each row
    #[arg(long, global = true)]
    classroom: Option<String>,

    /// Run without the preview window
    #[arg(long, global = true)]
    headless: bool,

    /// Stop after this many processed frames
    #[arg(long, global = true)]
    max_frames: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take attendance from a networked camera's snapshot URL
    WatchHttp {
        /// Snapshot URL (defaults to camera_url from the config)
        #[arg(long)]
        url: Option<String>,
    },
    /// Take attendance from a local V4L2 webcam
    WatchCamera {
        /// Device path (defaults to camera_device from the config)
        #[arg(long)]
        device: Option<String>,
    },
    /// Load and print the reference roster
    Roster {
        #[arg(long)]
        json: bool,
    },
    /// Summarize the attendance file
    Report {
        /// Keep only rows where any field contains this text (case-insensitive)
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::WatchHttp { url } => {
            let url = url.unwrap_or_else(|| config.camera_url.clone());
            let mut source = HttpSnapshotSource::new(&url, config.http_timeout())
                .with_context(|| format!("failed to set up HTTP client for {url}"))?;
            run_monitor(&config, &mut source)
        }
        Commands::WatchCamera { device } => {
            let device = device.unwrap_or_else(|| config.camera_device.clone());
            let mut camera =
                Camera::open(&device).with_context(|| format!("failed to open camera {device}"))?;
            run_monitor(&config, &mut camera)
        }
        Commands::Roster { json } => print_roster(&config, json),
        Commands::Report { search, json } => print_report(&config, search.as_deref(), json),
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from));
    let mut config = Config::load(path.as_deref()).context("failed to load configuration")?;

    if let Some(dir) = &cli.reference_dir {
        config.reference_dir = dir.clone();
    }
    if let Some(file) = &cli.attendance_file {
        config.attendance_file = file.clone();
    }
    if let Some(classroom) = &cli.classroom {
        config.classroom = classroom.clone();
    }
    if cli.headless {
        config.headless = true;
    }
    if cli.max_frames.is_some() {
        config.max_frames = cli.max_frames;
    }

    config.validate()?;
    Ok(config)
}

fn load_engine(config: &Config) -> Result<(OnnxFaceEncoder, Vec<ReferenceIdentity>)> {
    let mut encoder = OnnxFaceEncoder::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    let roster = load_roster(&config.reference_dir, &mut encoder).with_context(|| {
        format!(
            "failed to load reference images from {}",
            config.reference_dir.display()
        )
    })?;
    Ok((encoder, roster))
}

fn run_monitor(config: &Config, source: &mut dyn FrameSource) -> Result<()> {
    let (mut encoder, roster) = load_engine(config)?;
    if roster.is_empty() {
        tracing::warn!(
            dir = %config.reference_dir.display(),
            "no reference images found; nobody can be marked"
        );
    }

    let ledger = AttendanceLog::new(&config.attendance_file);
    let mut display: Box<dyn FrameDisplay> = if config.headless {
        Box::new(HeadlessDisplay)
    } else {
        Box::new(WindowDisplay::new(format!("rollcall: {}", config.classroom)))
    };

    let mut session = Session::start(&config.classroom);
    let stop = SessionLoop {
        source,
        encoder: &mut encoder,
        matcher: config.match_policy.matcher(),
        roster: &roster,
        ledger: &ledger,
        display: display.as_mut(),
        backoff: Backoff::new(config.backoff_base(), config.backoff_max()),
        settings: LoopSettings {
            threshold: config.similarity_threshold,
            frame_scale: config.frame_scale,
            max_frames: config.max_frames,
        },
    }
    .run(&mut session)
    .with_context(|| format!("session {} aborted", session.id()))?;

    let summary = session.finish(stop);
    println!(
        "Session {} in {} (started {}): {} marked in {} frames ({} skipped), {}s",
        summary.id,
        summary.classroom,
        summary.started_at.format("%Y-%m-%d %H:%M:%S"),
        summary.marked.len(),
        summary.frames_processed,
        summary.frames_skipped,
        summary.elapsed.as_secs()
    );
    for name in &summary.marked {
        println!("  {name}");
    }
    if let StopReason::SourceFailed(reason) = &summary.stop {
        println!("Stopped: {reason}");
    }
    Ok(())
}

fn print_roster(config: &Config, json: bool) -> Result<()> {
    let (_, roster) = load_engine(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&roster)?);
        return Ok(());
    }
    if roster.is_empty() {
        println!("No reference images in {}", config.reference_dir.display());
        return Ok(());
    }
    println!("{:<8} {:<14} {:<24} {}", "ROLL", "PRN", "NAME", "DIVISION");
    for identity in &roster {
        println!(
            "{:<8} {:<14} {:<24} {}",
            identity.roll_number,
            identity.prn,
            identity.display_name(),
            identity.division
        );
    }
    Ok(())
}

fn print_report(config: &Config, search: Option<&str>, json: bool) -> Result<()> {
    let ledger = AttendanceLog::new(&config.attendance_file);
    let rows = ledger
        .read_all()
        .with_context(|| format!("failed to read {}", config.attendance_file.display()))?;
    let report = AttendanceReport::build(filter_rows(rows, search));

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Total: {}", report.total);
    println!("By division:");
    for (division, count) in &report.by_division {
        println!("  {division:<10} {count}");
    }
    println!("By classroom:");
    for (classroom, count) in &report.by_classroom {
        println!("  {classroom:<10} {count}");
    }
    println!();
    println!(
        "{:<8} {:<14} {:<24} {:<9} {:<20} {}",
        "ROLL", "PRN", "NAME", "DIVISION", "TIME", "CLASSROOM"
    );
    for row in &report.rows {
        println!(
            "{:<8} {:<14} {:<24} {:<9} {:<20} {}",
            row.roll_number,
            row.prn,
            format!("{} {}", row.first_name, row.last_name),
            row.division,
            row.time,
            row.classroom
        );
    }
    Ok(())
}
