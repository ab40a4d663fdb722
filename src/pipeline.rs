//! End-to-end cartoon video job.
//!
//! [`CartoonVideo`] runs every stage in order: load the source image,
//! stylize it once, replicate it into a frame sequence inside a scoped
//! [`Workspace`], encode the sequence, and optionally attach a soundtrack.
//! The workspace is torn down on every exit path.
//!
//! # Example
//!
//! ```no_run
//! use toonify::{CartoonVideo, ToonifyError};
//!
//! let video = CartoonVideo::new("portrait.jpg", "cartoon.mp4")
//!     .minutes(0.5)?
//!     .fps(24)
//!     .audio("song.mp3")
//!     .run()?;
//! println!("{} frames, {:?}", video.frame_count, video.duration());
//! # Ok::<(), ToonifyError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::DynamicImage;

use crate::configuration::{FrameStorage, PipelineOptions, duration_from_minutes, frame_count};
use crate::encode::{VideoEncoder, VideoEncoderOptions, VideoStream};
use crate::error::ToonifyError;
use crate::frame_store::{DirectoryFrameStore, FrameStore, MemoryFrameStore};
use crate::materialize::FrameMaterializer;
use crate::mux::{AudioMuxOptions, AudioMuxer};
use crate::stylize::{StylizeOptions, Stylizer, load_source_image};
use crate::workspace::Workspace;

/// Default clip length: five seconds.
const DEFAULT_DURATION: Duration = Duration::from_secs(5);

/// A single image-to-video run.
#[derive(Debug, Clone)]
pub struct CartoonVideo {
    image: PathBuf,
    output: PathBuf,
    duration: Duration,
    audio: Option<PathBuf>,
    stylize: StylizeOptions,
    encoder: VideoEncoderOptions,
    mux: AudioMuxOptions,
    storage: FrameStorage,
    workspace_root: Option<PathBuf>,
    options: PipelineOptions,
}

impl CartoonVideo {
    /// A job turning `image` into a video at `output`, five seconds long at
    /// 24 fps, grayscale, H.264, without audio.
    pub fn new<I: AsRef<Path>, O: AsRef<Path>>(image: I, output: O) -> Self {
        Self {
            image: image.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            duration: DEFAULT_DURATION,
            audio: None,
            stylize: StylizeOptions::default(),
            encoder: VideoEncoderOptions::default(),
            mux: AudioMuxOptions::default(),
            storage: FrameStorage::default(),
            workspace_root: None,
            options: PipelineOptions::default(),
        }
    }

    /// Set the clip length in (possibly fractional) minutes.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::Config`] if `minutes` is not positive and finite.
    pub fn minutes(mut self, minutes: f64) -> Result<Self, ToonifyError> {
        self.duration = duration_from_minutes(minutes)?;
        Ok(self)
    }

    /// Set the clip length.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the frame rate.
    pub fn fps(mut self, fps: u32) -> Self {
        self.encoder.fps = fps;
        self
    }

    /// Attach the audio track of `path` to the finished video.
    pub fn audio<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.audio = Some(path.as_ref().to_path_buf());
        self
    }

    /// Stylizer settings.
    pub fn stylize_options(mut self, options: StylizeOptions) -> Self {
        self.stylize = options;
        self
    }

    /// Encoder settings. The frame rate set here replaces any earlier
    /// [`fps`](CartoonVideo::fps) call.
    pub fn encoder_options(mut self, options: VideoEncoderOptions) -> Self {
        self.encoder = options;
        self
    }

    /// Audio muxer settings.
    pub fn mux_options(mut self, options: AudioMuxOptions) -> Self {
        self.mux = options;
        self
    }

    /// Where the replicated frames are kept between stylizing and encoding.
    pub fn storage(mut self, storage: FrameStorage) -> Self {
        self.storage = storage;
        self
    }

    /// Directory the per-run workspace is created in. Defaults to the
    /// output file's directory.
    pub fn workspace_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.workspace_root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Progress and cancellation settings.
    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of frames this job will produce.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::Config`] if the frame rate is zero or the duration is
    /// too short to hold a single frame.
    pub fn frame_count(&self) -> Result<u64, ToonifyError> {
        let count = frame_count(self.encoder.fps, self.duration)?;
        if count == 0 {
            return Err(ToonifyError::Config(format!(
                "{:?} at {} fps is shorter than one frame",
                self.duration, self.encoder.fps
            )));
        }
        Ok(count)
    }

    /// Run every stage and return the finished video.
    ///
    /// # Errors
    ///
    /// - [`ToonifyError::Config`] for an invalid duration, frame rate, or
    ///   output path; checked before anything is touched.
    /// - [`ToonifyError::Decode`] if the source image cannot be read; no
    ///   workspace is created in that case.
    /// - Any error of the materializer, encoder, or muxer stage.
    /// - [`ToonifyError::Cancelled`] if the run was cancelled.
    ///
    /// The workspace is removed whether the run succeeds or fails.
    pub fn run(&self) -> Result<VideoStream, ToonifyError> {
        let count = self.frame_count()?;
        if self.output.as_os_str().is_empty() {
            return Err(ToonifyError::Config("output path is empty".to_string()));
        }

        log::info!(
            "Rendering {:?} into {:?}: {count} frame(s) at {} fps",
            self.image,
            self.output,
            self.encoder.fps,
        );

        let source = load_source_image(&self.image)?;
        self.options.check_cancelled()?;

        let workspace = Workspace::temporary_in(self.workspace_parent())?;
        let video = self.render(&source, count, &workspace)?;
        workspace.close()?;

        let muxer = AudioMuxer::new(self.mux.clone()).with_options(self.options.clone());
        let video = muxer.attach(&video, self.audio.as_deref())?;

        log::info!("Finished {:?} ({:?})", video.path, video.duration());
        Ok(video)
    }

    /// Stylize, materialize, and encode inside `workspace`.
    fn render(
        &self,
        source: &DynamicImage,
        count: u64,
        workspace: &Workspace,
    ) -> Result<VideoStream, ToonifyError> {
        let frame = Stylizer::new(self.stylize).stylize(source);
        self.options.check_cancelled()?;

        let encoder =
            VideoEncoder::new(self.encoder.clone()).with_options(self.options.clone());
        let materializer = FrameMaterializer::with_options(self.options.clone());

        match self.storage {
            FrameStorage::Directory => {
                let mut store = DirectoryFrameStore::new(workspace.path(), count);
                let sequence = materializer.materialize(&frame, count, &mut store)?;
                encoder.encode(&sequence, &self.output)
            }
            FrameStorage::Memory => {
                let mut store = MemoryFrameStore::new();
                let sequence = materializer.materialize(&frame, count, &mut store)?;
                encoder.encode(&sequence, &self.output)
            }
            FrameStorage::Direct => encoder.encode_repeated(&frame, count, &self.output),
        }
    }

    fn workspace_parent(&self) -> PathBuf {
        if let Some(root) = &self.workspace_root {
            return root.clone();
        }
        match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
