//! Video encoder: write a frame sequence as a fixed-rate video stream.
//!
//! This module provides [`VideoEncoder`] for encoding a [`FrameSequence`]
//! (or one frame repeated `count` times) into a video container (MP4, MKV,
//! AVI, etc.) using FFmpeg. The container is inferred from the output file
//! extension.
//!
//! # Example
//!
//! ```no_run
//! use toonify::{FrameMaterializer, MemoryFrameStore, ToonifyError, VideoEncoder, VideoEncoderOptions};
//!
//! let frame = toonify::load_source_image("cartoon.png")?;
//! let mut store = MemoryFrameStore::new();
//! let sequence = FrameMaterializer::new().materialize(&frame, 48, &mut store)?;
//! let video = VideoEncoder::new(VideoEncoderOptions::default().fps(24))
//!     .encode(&sequence, "cartoon.mp4")?;
//! println!("{:?}", video.duration());
//! # Ok::<(), ToonifyError>(())
//! ```

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Dictionary, Packet, Rational};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use crate::configuration::PipelineOptions;
use crate::conversion::rgb_buffer_into_frame;
use crate::error::ToonifyError;
use crate::materialize::FrameSequence;
use crate::progress::{OperationType, ProgressTracker};

/// Options for the video encoder.
///
/// Controls the output codec, frame rate, and quality.
#[derive(Debug, Clone)]
pub struct VideoEncoderOptions {
    /// Frames per second (default: 24).
    pub fps: u32,
    /// Codec to use. Default is H.264.
    pub codec: VideoCodec,
    /// Constant Rate Factor for quality (0-51, lower is better). Default: 23.
    /// Only honoured by the H.264 / H.265 encoders.
    pub crf: Option<u32>,
    /// Bitrate in bits per second. If set, overrides CRF.
    pub bitrate: Option<usize>,
}

impl Default for VideoEncoderOptions {
    fn default() -> Self {
        Self {
            fps: 24,
            codec: VideoCodec::H264,
            crf: Some(23),
            bitrate: None,
        }
    }
}

impl VideoEncoderOptions {
    /// Set the frame rate.
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the codec.
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value.
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    /// Set the target bitrate in bits per second.
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// H.264 / AVC.
    #[default]
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2 (for AVI compatibility).
    Mpeg4,
}

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }

    fn supports_crf(self) -> bool {
        matches!(self, VideoCodec::H264 | VideoCodec::H265)
    }

    /// Parse a codec name as accepted by the CLI. Case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "x264" => Some(VideoCodec::H264),
            "h265" | "hevc" | "x265" => Some(VideoCodec::H265),
            "mpeg4" | "mp4v" => Some(VideoCodec::Mpeg4),
            _ => None,
        }
    }
}

/// An encoded video file produced by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStream {
    /// Where the container was written.
    pub path: PathBuf,
    /// Frame rate the stream was encoded at.
    pub fps: u32,
    /// Number of video frames in the stream.
    pub frame_count: u64,
    /// Encoded frame width.
    pub width: u32,
    /// Encoded frame height.
    pub height: u32,
    /// Whether an audio track has been muxed in.
    pub has_audio: bool,
}

impl VideoStream {
    /// Playback length of the video track: `frame_count / fps`.
    pub fn duration(&self) -> Duration {
        if self.fps == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count as f64 / self.fps as f64)
    }
}

/// Encodes frames into a video file.
///
/// Create via [`VideoEncoder::new`], then call [`encode`](VideoEncoder::encode)
/// or [`encode_repeated`](VideoEncoder::encode_repeated).
pub struct VideoEncoder {
    config: VideoEncoderOptions,
    options: PipelineOptions,
}

impl VideoEncoder {
    /// Create a new video encoder with the given options.
    pub fn new(config: VideoEncoderOptions) -> Self {
        Self {
            config,
            options: PipelineOptions::default(),
        }
    }

    /// Use the given run options for progress and cancellation.
    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Encode `sequence` to `path`, frames in index order.
    ///
    /// # Errors
    ///
    /// - [`ToonifyError::SequenceIntegrity`] if the sequence has a gap;
    ///   checked before the output is created.
    /// - [`ToonifyError::Encode`] if the sequence is empty or the sink
    ///   cannot be opened, written, or finalized. A partially written
    ///   output is removed.
    pub fn encode<P: AsRef<Path>>(
        &self,
        sequence: &FrameSequence<'_>,
        path: P,
    ) -> Result<VideoStream, ToonifyError> {
        sequence.verify()?;
        if sequence.is_empty() {
            return Err(ToonifyError::Encode("no frames to encode".to_string()));
        }

        let first = sequence.frame(0)?;
        let (width, height) = (first.width(), first.height());
        drop(first);

        self.write(path.as_ref(), width, height, sequence.len(), |index| {
            sequence.frame(index).map(|frame| Cow::Owned(frame.to_rgb8()))
        })
    }

    /// Encode `frame` repeated `count` times to `path` without storing
    /// intermediate artifacts. The output is identical to encoding a
    /// materialized sequence of the same frame.
    ///
    /// # Errors
    ///
    /// Same as [`encode`](VideoEncoder::encode).
    pub fn encode_repeated<P: AsRef<Path>>(
        &self,
        frame: &DynamicImage,
        count: u64,
        path: P,
    ) -> Result<VideoStream, ToonifyError> {
        if count == 0 {
            return Err(ToonifyError::Encode("no frames to encode".to_string()));
        }
        let rgb = frame.to_rgb8();
        self.write(path.as_ref(), rgb.width(), rgb.height(), count, |_| {
            Ok(Cow::Borrowed(&rgb))
        })
    }

    /// Run the encode, removing the output if anything fails once the sink
    /// may have created it.
    fn write<'f, F>(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        count: u64,
        next_frame: F,
    ) -> Result<VideoStream, ToonifyError>
    where
        F: FnMut(u64) -> Result<Cow<'f, RgbImage>, ToonifyError>,
    {
        if self.config.fps == 0 {
            return Err(ToonifyError::Config(
                "frame rate must be greater than zero".to_string(),
            ));
        }
        if width < 2 || height < 2 {
            return Err(ToonifyError::Encode(format!(
                "frame of {width}x{height} is too small to encode"
            )));
        }

        let result = self.write_frames(path, width, height, count, next_frame);
        if result.is_err() && path.exists() {
            match fs::remove_file(path) {
                Ok(()) => log::warn!("Removed incomplete output {:?}", path),
                Err(error) => log::warn!("Failed to remove incomplete output {:?}: {error}", path),
            }
        }
        result
    }

    fn write_frames<'f, F>(
        &self,
        path: &Path,
        source_width: u32,
        source_height: u32,
        count: u64,
        mut next_frame: F,
    ) -> Result<VideoStream, ToonifyError>
    where
        F: FnMut(u64) -> Result<Cow<'f, RgbImage>, ToonifyError>,
    {
        log::info!(
            "Writing {} frames to {:?} (codec={:?}, fps={})",
            count, path, self.config.codec, self.config.fps,
        );

        ffmpeg_next::init()
            .map_err(|e| ToonifyError::Encode(format!("FFmpeg initialisation failed: {e}")))?;

        // YUV 4:2:0 needs even dimensions; drop the last odd row/column.
        let width = source_width & !1;
        let height = source_height & !1;
        if (width, height) != (source_width, source_height) {
            log::warn!(
                "Cropping {}x{} frames to {}x{} for 4:2:0 chroma subsampling",
                source_width, source_height, width, height,
            );
        }

        let fps = self.config.fps as i32;
        let encoder_time_base = Rational::new(1, fps);
        let codec_id = self.config.codec.to_codec_id();
        let target_pixel = Pixel::YUV420P;

        let mut output = ffmpeg_next::format::output(path)
            .map_err(|e| ToonifyError::Encode(format!("cannot open output {path:?}: {e}")))?;

        // Check if we need global header before adding the stream (avoids borrow conflict).
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let encoder_codec = ffmpeg_next::encoder::find(codec_id)
            .ok_or_else(|| ToonifyError::Encode(format!("codec {codec_id:?} not available")))?;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|e| ToonifyError::Encode(format!("cannot add stream: {e}")))?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .map_err(|e| ToonifyError::Encode(format!("cannot create codec context: {e}")))?
            .encoder()
            .video()
            .map_err(|e| ToonifyError::Encode(format!("cannot open video encoder: {e}")))?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(target_pixel);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(Rational::new(fps, 1)));

        if let Some(bitrate) = self.config.bitrate {
            encoder.set_bit_rate(bitrate);
        }

        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut codec_options = Dictionary::new();
        if self.config.bitrate.is_none()
            && self.config.codec.supports_crf()
            && let Some(crf) = self.config.crf
        {
            codec_options.set("crf", &crf.to_string());
        }

        let mut opened_encoder = encoder
            .open_as_with(encoder_codec, codec_options)
            .map_err(|e| ToonifyError::Encode(format!("cannot open encoder: {e}")))?;

        stream.set_parameters(&opened_encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .map_err(|e| ToonifyError::Encode(format!("cannot write header: {e}")))?;

        // The muxer may pick its own time base while writing the header.
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| ToonifyError::Encode("output stream vanished".to_string()))?;

        let mut scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            target_pixel,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|e| ToonifyError::Encode(format!("cannot create scaler: {e}")))?;

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::Encoding,
            Some(count),
            self.options.batch_size,
        );

        let mut src_frame = VideoFrame::new(Pixel::RGB24, width, height);
        let sink = PacketSink {
            stream_index,
            encoder_time_base,
            stream_time_base,
        };

        for index in 0..count {
            self.options.check_cancelled()?;

            let rgb = next_frame(index)?;
            let rgb = fit_to(rgb, width, height);
            rgb_buffer_into_frame(rgb.as_raw(), width, height, &mut src_frame);

            let mut dst_frame = VideoFrame::empty();
            scaler
                .run(&src_frame, &mut dst_frame)
                .map_err(|e| ToonifyError::Encode(format!("scaling failed: {e}")))?;
            dst_frame.set_pts(Some(index as i64));

            opened_encoder
                .send_frame(&dst_frame)
                .map_err(|e| ToonifyError::Encode(format!("send_frame failed: {e}")))?;
            sink.drain(&mut opened_encoder, &mut output)?;

            tracker.advance(Some(index));
        }

        opened_encoder
            .send_eof()
            .map_err(|e| ToonifyError::Encode(format!("send_eof failed: {e}")))?;
        sink.drain(&mut opened_encoder, &mut output)?;

        output
            .write_trailer()
            .map_err(|e| ToonifyError::Encode(format!("cannot write trailer: {e}")))?;
        tracker.finish();

        log::info!("Finished {:?} ({} frames)", path, count);

        Ok(VideoStream {
            path: path.to_path_buf(),
            fps: self.config.fps,
            frame_count: count,
            width,
            height,
            has_audio: false,
        })
    }
}

/// Moves encoded packets from the encoder into the output container.
struct PacketSink {
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
}

impl PacketSink {
    fn drain(
        &self,
        encoder: &mut ffmpeg_next::encoder::Video,
        output: &mut Output,
    ) -> Result<(), ToonifyError> {
        let mut packet = Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(output)
                .map_err(|e| ToonifyError::Encode(format!("write packet failed: {e}")))?;
        }
        Ok(())
    }
}

/// Bring a frame to the encoder's dimensions: crop the odd row/column off a
/// frame of the source size, resize anything else.
fn fit_to(rgb: Cow<'_, RgbImage>, width: u32, height: u32) -> Cow<'_, RgbImage> {
    if rgb.width() == width && rgb.height() == height {
        return rgb;
    }
    if rgb.width() >= width
        && rgb.height() >= height
        && rgb.width() - width <= 1
        && rgb.height() - height <= 1
    {
        return Cow::Owned(image::imageops::crop_imm(&*rgb, 0, 0, width, height).to_image());
    }
    Cow::Owned(image::imageops::resize(
        &*rgb,
        width,
        height,
        FilterType::Lanczos3,
    ))
}
