use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde_json::json;
use toonify::{
    CancellationToken, CartoonVideo, ColorMode, FfmpegLogLevel, FrameStorage, MediaProbe,
    OperationType, PipelineOptions, ProgressCallback, ProgressInfo, StylizeOptions, ToonifyError,
    VideoCodec, VideoEncoderOptions,
};

const CLI_AFTER_HELP: &str = "Examples:\n  toonify render portrait.jpg --minutes 0.5 --fps 24 --out cartoon.mp4\n  toonify render portrait.jpg --minutes 1 --fps 30 --out cartoon.mp4 --audio song.mp3 --color --progress\n  toonify probe cartoon.mp4 --json\n  toonify completions zsh > _toonify";

#[derive(Debug, Parser)]
#[command(
    name = "toonify",
    version,
    about = "Turn a still image into a cartoon-styled video clip",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while rendering.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a cartoon video from an image.
    #[command(
        about = "Render a cartoon video from an image",
        after_help = "Examples:\n  toonify render portrait.jpg --minutes 0.1 --fps 24 --out cartoon.mp4\n  toonify render portrait.png --minutes 2 --fps 12 --out clip.mkv --codec h265 --storage memory"
    )]
    Render {
        /// Source image path.
        image: PathBuf,
        /// Clip length in minutes (fractions allowed).
        #[arg(long)]
        minutes: f64,
        /// Frames per second.
        #[arg(long, default_value_t = 24)]
        fps: u32,
        /// Output video path; the extension picks the container.
        #[arg(long)]
        out: PathBuf,
        /// Optional soundtrack to mux into the video.
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Keep the image's colors instead of rendering in grayscale.
        #[arg(long)]
        color: bool,
        /// Video codec: h264 | h265 | mpeg4.
        #[arg(long, default_value = "h264")]
        codec: String,
        /// Constant rate factor for H.264 / H.265 (0-51, lower is better).
        #[arg(long)]
        crf: Option<u32>,
        /// Frame storage: directory | memory | direct.
        #[arg(long, default_value = "directory")]
        storage: String,
        /// Directory to create the per-run frame workspace in.
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Print facts about an encoded file.
    #[command(
        about = "Print media information",
        visible_alias = "info",
        after_help = "Examples:\n  toonify probe cartoon.mp4\n  toonify probe cartoon.mp4 --json"
    )]
    Probe {
        /// Media file to inspect.
        input: PathBuf,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_storage(value: &str) -> Option<FrameStorage> {
    match value.to_ascii_lowercase().as_str() {
        "directory" | "dir" | "disk" => Some(FrameStorage::Directory),
        "memory" | "mem" => Some(FrameStorage::Memory),
        "direct" | "none" => Some(FrameStorage::Direct),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

/// Prints log records to stderr, tagged and colored by level.
struct TerminalLogger {
    level: LevelFilter,
}

impl Log for TerminalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "error:".red().bold(),
            Level::Warn => "warning:".yellow().bold(),
            Level::Info => "info:".green().bold(),
            Level::Debug => "debug:".blue().bold(),
            Level::Trace => "trace:".dimmed(),
        };
        eprintln!("{tag} {}", record.args());
    }

    fn flush(&self) {}
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let level = if global.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    log::set_boxed_logger(Box::new(TerminalLogger { level }))?;
    log::set_max_level(level);

    if let Some(level) = &global.log_level {
        let parsed =
            FfmpegLogLevel::parse(level).ok_or(format!("unsupported --log-level: {level}"))?;
        toonify::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

/// A single indicatif bar that restarts for each pipeline stage.
struct TerminalProgress {
    bar: ProgressBar,
    stage: Mutex<Option<OperationType>>,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {msg:<12} {bar:40.cyan/blue} {pos}/{len}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self {
            bar,
            stage: Mutex::new(None),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn stage_label(operation: OperationType) -> &'static str {
    match operation {
        OperationType::Materializing => "frames",
        OperationType::Encoding => "encoding",
        OperationType::Muxing => "audio",
        _ => "working",
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Ok(mut stage) = self.stage.lock()
            && *stage != Some(info.operation)
        {
            *stage = Some(info.operation);
            self.bar.reset();
            self.bar.set_length(info.total.unwrap_or(0));
            self.bar.set_message(stage_label(info.operation));
        }
        self.bar.set_position(info.current);
    }
}

/// Exit status after a second Ctrl-C (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Cancel `token` when the user presses Ctrl-C; a second press exits
/// immediately.
fn cancel_on_interrupt(token: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("toonify-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if next_interrupt(&token) == Interrupt::Exit {
                        eprintln!("{}", "interrupted".red().bold());
                        std::process::exit(INTERRUPTED_EXIT_CODE);
                    }
                    log::warn!("interrupt received; stopping at the next frame");
                    log::warn!("press Ctrl-C again to quit immediately");
                }
            });
        })?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Cancel,
    Exit,
}

/// The first interrupt cancels the run; any later one exits.
fn next_interrupt(token: &CancellationToken) -> Interrupt {
    if token.is_cancelled() {
        Interrupt::Exit
    } else {
        token.cancel();
        Interrupt::Cancel
    }
}

#[allow(clippy::too_many_arguments)]
fn render(
    global: &GlobalOptions,
    image: PathBuf,
    minutes: f64,
    fps: u32,
    out: PathBuf,
    audio: Option<PathBuf>,
    color: bool,
    codec: &str,
    crf: Option<u32>,
    storage: &str,
    workspace: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let codec = VideoCodec::parse(codec).ok_or(format!("unsupported --codec: {codec}"))?;
    let storage = parse_storage(storage).ok_or(format!("unsupported --storage: {storage}"))?;
    ensure_writable_path(&out, global.overwrite)?;

    let mut encoder = VideoEncoderOptions::default().fps(fps).codec(codec);
    if let Some(crf) = crf {
        encoder = encoder.crf(crf);
    }
    let color_mode = if color {
        ColorMode::Color
    } else {
        ColorMode::Grayscale
    };

    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone())?;

    let mut options = PipelineOptions::new().with_cancellation(token);
    let progress = if global.progress {
        let progress = Arc::new(TerminalProgress::new()?);
        options = options
            .with_progress(progress.clone())
            .with_batch_size(fps.max(1) as u64);
        Some(progress)
    } else {
        None
    };

    let mut job = CartoonVideo::new(&image, &out)
        .minutes(minutes)?
        .encoder_options(encoder)
        .stylize_options(StylizeOptions::new().color_mode(color_mode))
        .storage(storage)
        .options(options);
    if let Some(audio) = audio {
        job = job.audio(audio);
    }
    if let Some(workspace) = workspace {
        job = job.workspace_root(workspace);
    }

    let result = job.run();
    if let Some(progress) = &progress {
        progress.finish();
    }

    let video = match result {
        Err(ToonifyError::Cancelled) => return Err("interrupted; no output written".into()),
        other => other?,
    };

    println!(
        "{} {} ({} frames, {:.2}s{})",
        "saved".green().bold(),
        video.path.display(),
        video.frame_count,
        video.duration().as_secs_f64(),
        if video.has_audio { ", with audio" } else { "" },
    );
    Ok(())
}

fn probe(input: &Path, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let info = MediaProbe::probe(input)?;
    if as_json {
        let payload = json!({
            "format": info.format,
            "duration_seconds": info.duration.as_secs_f64(),
            "video": info.video.as_ref().map(|video| json!({
                "width": video.width,
                "height": video.height,
                "fps": video.frames_per_second,
                "frame_count": video.frame_count,
                "duration_seconds": video.duration.as_secs_f64(),
                "codec": video.codec,
            })),
            "audio": info.audio.as_ref().map(|audio| json!({
                "sample_rate": audio.sample_rate,
                "channels": audio.channels,
                "duration_seconds": audio.duration.as_secs_f64(),
                "codec": audio.codec,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Format: {}", info.format);
        println!("Duration: {:?}", info.duration);
        if let Some(video) = &info.video {
            println!(
                "Video: {}x{} @ {:.2} fps, {} frames [{}]",
                video.width, video.height, video.frames_per_second, video.frame_count, video.codec,
            );
        }
        if let Some(audio) = &info.audio {
            println!(
                "Audio: {} Hz, {} ch, {:.2}s [{}]",
                audio.sample_rate,
                audio.channels,
                audio.duration.as_secs_f64(),
                audio.codec,
            );
        }
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Render {
            image,
            minutes,
            fps,
            out,
            audio,
            color,
            codec,
            crf,
            storage,
            workspace,
        } => render(
            &cli.global,
            image,
            minutes,
            fps,
            out,
            audio,
            color,
            &codec,
            crf,
            &storage,
            workspace,
        )?,
        Commands::Probe { input, json } => probe(&input, json)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "toonify", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
