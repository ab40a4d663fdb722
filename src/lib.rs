//! # toonify
//!
//! Turn a still image into a cartoon-styled video clip, optionally with a
//! soundtrack.
//!
//! `toonify` stylizes an image once (edge-preserving smoothing masked by
//! adaptive-threshold edges), replicates the stylized frame into a
//! fixed-length sequence, and encodes it through FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Render a Clip
//!
//! ```no_run
//! use toonify::CartoonVideo;
//!
//! let video = CartoonVideo::new("portrait.jpg", "cartoon.mp4")
//!     .minutes(0.1)
//!     .unwrap()
//!     .fps(24)
//!     .run()
//!     .unwrap();
//! assert_eq!(video.frame_count, 144);
//! ```
//!
//! ### Stylize Only
//!
//! ```no_run
//! use toonify::{ColorMode, StylizeOptions, Stylizer};
//!
//! let image = toonify::load_source_image("portrait.jpg").unwrap();
//! let stylizer = Stylizer::new(StylizeOptions::new().color_mode(ColorMode::Color));
//! stylizer.stylize(&image).save("portrait-toon.png").unwrap();
//! ```
//!
//! ### Run the Stages Yourself
//!
//! ```no_run
//! use std::path::Path;
//!
//! use toonify::{
//!     AudioMuxOptions, AudioMuxer, DirectoryFrameStore, FrameMaterializer, StylizeOptions,
//!     Stylizer, VideoEncoder, VideoEncoderOptions, Workspace,
//! };
//!
//! let image = toonify::load_source_image("portrait.jpg").unwrap();
//! let frame = Stylizer::new(StylizeOptions::default()).stylize(&image);
//!
//! let workspace = Workspace::temporary_in(".").unwrap();
//! let mut store = DirectoryFrameStore::new(workspace.path(), 120);
//! let sequence = FrameMaterializer::new().materialize(&frame, 120, &mut store).unwrap();
//!
//! let video = VideoEncoder::new(VideoEncoderOptions::default())
//!     .encode(&sequence, "cartoon.mp4")
//!     .unwrap();
//! let video = AudioMuxer::new(AudioMuxOptions::default())
//!     .attach(&video, Some(Path::new("song.mp3")))
//!     .unwrap();
//! workspace.close().unwrap();
//! ```
//!
//! ## Features
//!
//! - **Cartoon stylizer**: bilateral smoothing plus mean adaptive-threshold
//!   edge mask, in grayscale or color
//! - **Frame stores**: PNG files in a scoped workspace, or in memory
//! - **Encoding**: H.264, H.265, or MPEG-4 at any integer frame rate
//! - **Soundtracks**: AAC audio muxed in, truncated to the video length
//! - **Progress & cancellation**: cooperative callbacks and
//!   `CancellationToken` for every long-running stage
//! - **Probing**: `MediaProbe` for checking what was written
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Bilateral filter rows computed in parallel (identical output) |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod configuration;
mod conversion;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod frame_store;
pub mod materialize;
pub mod mux;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod stylize;
pub mod workspace;

pub use configuration::{ColorMode, FrameStorage, PipelineOptions, duration_from_minutes, frame_count};
pub use encode::{VideoCodec, VideoEncoder, VideoEncoderOptions, VideoStream};
pub use error::ToonifyError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame_store::{
    DirectoryFrameStore, FrameStore, MemoryFrameStore, frame_file_name, index_width,
};
pub use materialize::{FrameMaterializer, FrameSequence};
pub use mux::{AudioMuxOptions, AudioMuxer};
pub use pipeline::CartoonVideo;
pub use probe::{AudioInfo, MediaInfo, MediaProbe, VideoInfo};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use stylize::{StylizeOptions, Stylizer, load_source_image};
pub use workspace::Workspace;
