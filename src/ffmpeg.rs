//! FFmpeg log level configuration.
//!
//! FFmpeg logs to stderr on its own, independently of the Rust
//! [`log`](https://crates.io/crates/log) facade that `toonify` uses for its
//! stage messages. Encoders such as libx264 are chatty at the default
//! level, so the CLI exposes `--log-level` through these wrappers.
//!
//! # Example
//!
//! ```no_run
//! use toonify::FfmpegLogLevel;
//!
//! toonify::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use ffmpeg_next::util::log::Level;

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants, from `Quiet` (nothing)
/// up to `Trace` (everything).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only unrecoverable conditions that abort the process.
    Panic,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }

    /// Parse a level name as accepted by the CLI (`warn` is an alias of
    /// `warning`). Case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Some(FfmpegLogLevel::Quiet),
            "panic" => Some(FfmpegLogLevel::Panic),
            "fatal" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" => Some(FfmpegLogLevel::Info),
            "verbose" => Some(FfmpegLogLevel::Verbose),
            "debug" => Some(FfmpegLogLevel::Debug),
            "trace" => Some(FfmpegLogLevel::Trace),
            _ => None,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This controls what FFmpeg prints to stderr. It does not affect
/// `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Get the current FFmpeg internal log verbosity level.
///
/// Returns `None` if the current level does not map to a known variant.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_ffmpeg_level)
}
