//! Lightweight inspection of encoded media files.
//!
//! [`MediaProbe`] opens a container, reads stream facts, and closes it
//! again. The CLI's `probe` command prints these facts, and the tests use
//! them to check what the encoder and muxer wrote.
//!
//! # Example
//!
//! ```no_run
//! use toonify::MediaProbe;
//!
//! let info = MediaProbe::probe("cartoon.mp4")?;
//! println!("Duration: {:?}, format: {}", info.duration, info.format);
//! if let Some(video) = &info.video {
//!     println!("Video: {}x{} @ {} fps", video.width, video.height, video.frames_per_second);
//! }
//! # Ok::<(), toonify::ToonifyError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{Stream, codec::context::Context as CodecContext, media::Type};

use crate::conversion::pts_to_duration;
use crate::error::ToonifyError;

/// Facts about the best video stream of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate.
    pub frames_per_second: f64,
    /// Frame count as recorded by the container, or estimated from the
    /// stream duration when the container does not record it.
    pub frame_count: u64,
    /// Stream duration.
    pub duration: Duration,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
}

/// Facts about the best audio stream of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Stream duration.
    pub duration: Duration,
    /// Codec name (e.g. `"aac"`).
    pub codec: String,
}

/// Container-level facts plus the best video and audio streams.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format: String,
    /// Container duration.
    pub duration: Duration,
    /// Best video stream, if any.
    pub video: Option<VideoInfo>,
    /// Best audio stream, if any.
    pub audio: Option<AudioInfo>,
}

/// Lightweight media file probe.
pub struct MediaProbe;

impl MediaProbe {
    /// Probe a media file.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::Decode`] if the file cannot be opened or recognised
    /// as a media container.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<MediaInfo, ToonifyError> {
        let path = path.as_ref();
        let decode_error = |reason: String| ToonifyError::Decode {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| decode_error(format!("FFmpeg initialisation failed: {error}")))?;
        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| decode_error(error.to_string()))?;

        let duration_microseconds = input_context.duration();
        let duration = if duration_microseconds > 0 {
            Duration::from_micros(duration_microseconds as u64)
        } else {
            Duration::ZERO
        };
        let format = input_context.format().name().to_string();

        let video = match input_context.streams().best(Type::Video) {
            Some(stream) => Some(
                video_info(&stream, duration)
                    .map_err(|error| decode_error(format!("unreadable video stream: {error}")))?,
            ),
            None => None,
        };
        let audio = match input_context.streams().best(Type::Audio) {
            Some(stream) => Some(
                audio_info(&stream, duration)
                    .map_err(|error| decode_error(format!("unreadable audio stream: {error}")))?,
            ),
            None => None,
        };

        log::debug!(
            "Probed {:?}: format={}, duration={:.3}s, video={}, audio={}",
            path,
            format,
            duration.as_secs_f64(),
            video.is_some(),
            audio.is_some(),
        );

        Ok(MediaInfo {
            format,
            duration,
            video,
            audio,
        })
    }
}

/// Stream duration, falling back to the container duration when the stream
/// does not carry one.
fn stream_duration(stream: &Stream, container_duration: Duration) -> Duration {
    let duration = stream.duration();
    if duration > 0 {
        pts_to_duration(duration, stream.time_base())
    } else {
        container_duration
    }
}

fn video_info(
    stream: &Stream,
    container_duration: Duration,
) -> Result<VideoInfo, ffmpeg_next::Error> {
    let decoder = CodecContext::from_parameters(stream.parameters())?
        .decoder()
        .video()?;

    let frame_rate = stream.avg_frame_rate();
    let frames_per_second = if frame_rate.denominator() != 0 {
        frame_rate.numerator() as f64 / frame_rate.denominator() as f64
    } else {
        let rate = stream.rate();
        if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        }
    };

    let duration = stream_duration(stream, container_duration);
    let frame_count = if stream.frames() > 0 {
        stream.frames() as u64
    } else {
        (duration.as_secs_f64() * frames_per_second).round() as u64
    };

    let codec = decoder
        .codec()
        .map(|codec| codec.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    Ok(VideoInfo {
        width: decoder.width(),
        height: decoder.height(),
        frames_per_second,
        frame_count,
        duration,
        codec,
    })
}

fn audio_info(
    stream: &Stream,
    container_duration: Duration,
) -> Result<AudioInfo, ffmpeg_next::Error> {
    let decoder = CodecContext::from_parameters(stream.parameters())?
        .decoder()
        .audio()?;

    let codec = decoder
        .codec()
        .map(|codec| codec.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    Ok(AudioInfo {
        sample_rate: decoder.rate(),
        channels: decoder.channels(),
        duration: stream_duration(stream, container_duration),
        codec,
    })
}
