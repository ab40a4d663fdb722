//! Run configuration.
//!
//! [`PipelineOptions`] is a builder that threads progress callbacks,
//! cancellation tokens, and reporting cadence through every stage without
//! polluting each signature. [`ColorMode`] and [`FrameStorage`] pick the
//! stylizer variant and the frame store backing a run.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use toonify::{CancellationToken, PipelineOptions, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_batch_size(24);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ToonifyError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Which buffer the stylizer smooths and masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Smooth and mask the luminance channel; the output is 8-bit grayscale.
    #[default]
    Grayscale,
    /// Smooth the RGB buffer and mask it with edges found in its luminance;
    /// the output keeps its color.
    Color,
}

/// Where the replicated frames live between stylizing and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStorage {
    /// PNG files inside the run's workspace directory.
    #[default]
    Directory,
    /// Encoded PNG buffers held in memory; the workspace stays empty.
    Memory,
    /// Skip materialization and hand the stylized frame to the encoder
    /// `count` times. Output is identical to the other modes.
    Direct,
}

/// Operational settings shared by every stage of a run.
pub struct PipelineOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
}

impl PipelineOptions {
    /// Default options: no progress reporting, no cancellation, batch size 1.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Report progress every `batch_size` items. Zero is clamped to 1.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Whether the attached token (if any) has been cancelled.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Return [`ToonifyError::Cancelled`] if cancellation was requested.
    pub(crate) fn check_cancelled(&self) -> Result<(), ToonifyError> {
        if self.is_cancelled() {
            Err(ToonifyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PipelineOptions {
    fn clone(&self) -> Self {
        Self {
            progress: Arc::clone(&self.progress),
            cancellation: self.cancellation.clone(),
            batch_size: self.batch_size,
        }
    }
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Number of frames needed to cover `duration` at `fps`:
/// `round(fps × seconds)`.
///
/// # Errors
///
/// [`ToonifyError::Config`] if `fps` is zero.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// // 0.1 minutes at 24 fps.
/// let count = toonify::frame_count(24, Duration::from_secs(6)).unwrap();
/// assert_eq!(count, 144);
/// ```
pub fn frame_count(fps: u32, duration: Duration) -> Result<u64, ToonifyError> {
    if fps == 0 {
        return Err(ToonifyError::Config(
            "frame rate must be greater than zero".to_string(),
        ));
    }
    Ok((fps as f64 * duration.as_secs_f64()).round() as u64)
}

/// Convert a duration given in (possibly fractional) minutes.
///
/// # Errors
///
/// [`ToonifyError::Config`] if `minutes` is not a positive finite number.
pub fn duration_from_minutes(minutes: f64) -> Result<Duration, ToonifyError> {
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(ToonifyError::Config(format!(
            "duration must be a positive number of minutes, got {minutes}"
        )));
    }
    Duration::try_from_secs_f64(minutes * 60.0)
        .map_err(|error| ToonifyError::Config(format!("duration out of range: {error}")))
}
