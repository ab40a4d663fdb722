//! Soundtrack muxing.
//!
//! [`AudioMuxer`] attaches an external audio track to a video written by
//! [`VideoEncoder`](crate::VideoEncoder). Video packets are copied verbatim
//! (no second lossy generation); the audio is decoded, resampled, and
//! re-encoded as AAC.
//!
//! # Length policy
//!
//! The video length never changes. Audio longer than the video is cut at
//! the last video frame; audio shorter than the video simply ends early and
//! the rest of the video plays silent.
//!
//! # Failure safety
//!
//! The muxed container is written to a uniquely named temporary file next
//! to the original and persisted over it only once its trailer is written.
//! If anything fails, the temporary file is removed and the original
//! video-only file is left untouched.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use toonify::{AudioMuxOptions, AudioMuxer, ToonifyError, VideoEncoder, VideoEncoderOptions};
//!
//! let frame = toonify::load_source_image("cartoon.png")?;
//! let video = VideoEncoder::new(VideoEncoderOptions::default())
//!     .encode_repeated(&frame, 240, "cartoon.mp4")?;
//! let video = AudioMuxer::new(AudioMuxOptions::default())
//!     .attach(&video, Some(Path::new("song.mp3")))?;
//! assert!(video.has_audio);
//! # Ok::<(), ToonifyError>(())
//! ```

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_next::{
    ChannelLayout, Codec, Packet, Rational,
    codec::{Id, context::Context as CodecContext},
    encoder::Audio as AudioEncoder,
    format::{Flags as FormatFlags, Sample, context::Output, sample::Type as SampleType},
    frame::Audio as AudioFrame,
    media::Type,
    software::resampling::Context as ResamplingContext,
};
use tempfile::NamedTempFile;

use crate::configuration::PipelineOptions;
use crate::conversion::{duration_to_samples, pts_to_duration};
use crate::encode::VideoStream;
use crate::error::ToonifyError;
use crate::progress::{OperationType, ProgressTracker};

/// Frame size used when the encoder accepts variable-sized frames.
const FALLBACK_FRAME_SIZE: usize = 1024;

/// Options for the audio muxer.
#[derive(Debug, Clone)]
pub struct AudioMuxOptions {
    /// AAC bitrate in bits per second (default: 128 kb/s).
    pub bitrate: usize,
}

impl Default for AudioMuxOptions {
    fn default() -> Self {
        Self { bitrate: 128_000 }
    }
}

impl AudioMuxOptions {
    /// Set the AAC bitrate in bits per second.
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = bitrate;
        self
    }
}

/// Attaches an audio track to an encoded video.
pub struct AudioMuxer {
    config: AudioMuxOptions,
    options: PipelineOptions,
}

impl AudioMuxer {
    /// Create a muxer with the given options.
    pub fn new(config: AudioMuxOptions) -> Self {
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

    /// Replace `video` with a copy carrying the audio of `audio_path`.
    ///
    /// With no audio path (or an empty one) this is a pass-through and
    /// `video` is returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`ToonifyError::Mux`] if the audio source cannot be opened or
    ///   decoded, has no audio stream, or the re-encode fails.
    /// - [`ToonifyError::Cancelled`] if the run was cancelled.
    ///
    /// In every error case the original file at `video.path` is intact.
    pub fn attach(
        &self,
        video: &VideoStream,
        audio_path: Option<&Path>,
    ) -> Result<VideoStream, ToonifyError> {
        let Some(audio_path) = audio_path.filter(|path| !path.as_os_str().is_empty()) else {
            log::debug!("No audio source; leaving {:?} as is", video.path);
            return Ok(video.clone());
        };

        log::info!("Muxing audio from {:?} into {:?}", audio_path, video.path);
        ffmpeg_next::init()
            .map_err(|e| ToonifyError::Mux(format!("FFmpeg initialisation failed: {e}")))?;

        let staging = staging_file_for(&video.path)?;
        self.mux_into(video, audio_path, staging.path())?;
        // Dropping `staging` on any earlier error removes it.
        staging.persist(&video.path).map_err(|error| {
            ToonifyError::Mux(format!(
                "cannot replace {:?} with muxed output: {}",
                video.path, error.error
            ))
        })?;

        Ok(VideoStream {
            has_audio: true,
            ..video.clone()
        })
    }

    fn mux_into(
        &self,
        video: &VideoStream,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<(), ToonifyError> {
        let mut video_input = ffmpeg_next::format::input(&video.path)
            .map_err(|e| ToonifyError::Mux(format!("cannot reopen video {:?}: {e}", video.path)))?;
        let mut audio_input = ffmpeg_next::format::input(&audio_path).map_err(|e| {
            ToonifyError::Mux(format!("cannot open audio source {audio_path:?}: {e}"))
        })?;

        let (video_in_index, video_in_time_base, video_parameters) = {
            let stream = video_input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| ToonifyError::Mux(format!("no video stream in {:?}", video.path)))?;
            (stream.index(), stream.time_base(), stream.parameters())
        };

        let (audio_in_index, mut decoder) = {
            let stream = audio_input.streams().best(Type::Audio).ok_or_else(|| {
                ToonifyError::Mux(format!("no audio stream in {audio_path:?}"))
            })?;
            let decoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().audio())
                .map_err(|e| ToonifyError::Mux(format!("cannot open audio decoder: {e}")))?;
            (stream.index(), decoder)
        };

        let mut output = ffmpeg_next::format::output(output_path)
            .map_err(|e| ToonifyError::Mux(format!("cannot create {output_path:?}: {e}")))?;
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        // Output stream 0: the video, stream-copied.
        {
            let mut stream = output
                .add_stream(ffmpeg_next::encoder::find(Id::None))
                .map_err(|e| ToonifyError::Mux(format!("cannot add video stream: {e}")))?;
            stream.set_parameters(video_parameters);
            // Reset codec tag to let the muxer choose.
            unsafe {
                (*stream.parameters().as_mut_ptr()).codec_tag = 0;
            }
        }

        // Output stream 1: the audio, re-encoded.
        let aac = ffmpeg_next::encoder::find(Id::AAC)
            .ok_or_else(|| ToonifyError::Mux("AAC encoder not available".to_string()))?;
        let sample_format = aac
            .audio()
            .ok()
            .and_then(|audio_codec| audio_codec.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(Sample::F32(SampleType::Planar));
        let sample_rate = pick_sample_rate(&aac, decoder.rate());
        let channel_layout = if decoder.channels() <= 1 {
            ChannelLayout::MONO
        } else {
            ChannelLayout::STEREO
        };

        let (mut encoder, encoder_time_base) = self.create_audio_encoder(
            aac,
            sample_format,
            sample_rate,
            channel_layout,
            needs_global_header,
        )?;
        {
            let mut stream = output
                .add_stream(aac)
                .map_err(|e| ToonifyError::Mux(format!("cannot add audio stream: {e}")))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_time_base);
        }

        output
            .write_header()
            .map_err(|e| ToonifyError::Mux(format!("cannot write header: {e}")))?;

        let video_out_time_base = output_time_base(&output, 0)?;
        let audio_out_time_base = output_time_base(&output, 1)?;

        // A still-image video compresses to very little, so its packets are
        // queued up front and interleaved with the audio as it is encoded.
        let mut video_queue = VideoQueue {
            packets: VecDeque::new(),
            time_base: video_out_time_base,
        };
        for (stream, mut packet) in video_input.packets() {
            if stream.index() != video_in_index {
                continue;
            }
            packet.set_stream(0);
            packet.rescale_ts(video_in_time_base, video_out_time_base);
            packet.set_position(-1);
            video_queue.packets.push_back(packet);
        }

        let sample_limit = duration_to_samples(video.duration(), sample_rate);
        let frame_size = match encoder.frame_size() as usize {
            0 => FALLBACK_FRAME_SIZE,
            size => size,
        };

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::Muxing,
            Some(sample_limit.div_ceil(frame_size as u64)),
            self.options.batch_size,
        );

        let mut state = AudioState {
            encoder: &mut encoder,
            encoder_time_base,
            audio_out_time_base,
            fifo: SampleFifo::new(sample_format, channel_layout, sample_rate),
            frame_size,
            samples_buffered: 0,
            samples_encoded: 0,
            sample_limit,
        };

        let mut resampler: Option<ResamplingContext> = None;
        let mut decoded = AudioFrame::empty();

        'packets: for (stream, packet) in audio_input.packets() {
            self.options.check_cancelled()?;
            if stream.index() != audio_in_index {
                continue;
            }
            decoder
                .send_packet(&packet)
                .map_err(|e| ToonifyError::Mux(format!("cannot decode audio: {e}")))?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                let active = resampler_for(&mut resampler, &mut decoded, &state)?;
                state.push_decoded(active, &decoded)?;
                state.encode_full_frames(&mut output, &mut video_queue, &mut tracker)?;
                if state.is_full() {
                    break 'packets;
                }
            }
        }

        if !state.is_full() {
            decoder
                .send_eof()
                .map_err(|e| ToonifyError::Mux(format!("cannot flush audio decoder: {e}")))?;
            while decoder.receive_frame(&mut decoded).is_ok() && !state.is_full() {
                let active = resampler_for(&mut resampler, &mut decoded, &state)?;
                state.push_decoded(active, &decoded)?;
                state.encode_full_frames(&mut output, &mut video_queue, &mut tracker)?;
            }
        }

        if let Some(resampler) = resampler.as_mut()
            && !state.is_full()
        {
            let mut tail = state.fifo.allocate(FALLBACK_FRAME_SIZE);
            if resampler.flush(&mut tail).is_ok() && tail.samples() > 0 {
                state.push_resampled(&tail)?;
            }
        }

        state.encode_remaining(&mut output, &mut video_queue, &mut tracker)?;
        if state.samples_encoded == 0 {
            return Err(ToonifyError::Mux(format!(
                "audio source {audio_path:?} decoded to no samples"
            )));
        }

        video_queue.write_all(&mut output)?;
        output
            .write_trailer()
            .map_err(|e| ToonifyError::Mux(format!("cannot write trailer: {e}")))?;
        tracker.finish();

        log::info!(
            "Muxed {:.3}s of audio into {:.3}s of video",
            state.samples_encoded as f64 / sample_rate as f64,
            video.duration().as_secs_f64(),
        );
        Ok(())
    }

    /// Create an AAC encoder for the chosen output format.
    fn create_audio_encoder(
        &self,
        codec: Codec,
        sample_format: Sample,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        needs_global_header: bool,
    ) -> Result<(AudioEncoder, Rational), ToonifyError> {
        let mut encoder_context = CodecContext::new()
            .encoder()
            .audio()
            .map_err(|e| ToonifyError::Mux(format!("cannot create audio encoder: {e}")))?;

        let time_base = Rational(1, sample_rate as i32);
        encoder_context.set_rate(sample_rate as i32);
        encoder_context.set_channel_layout(channel_layout);
        encoder_context.set_format(sample_format);
        encoder_context.set_time_base(time_base);
        encoder_context.set_bit_rate(self.config.bitrate);

        if needs_global_header {
            unsafe {
                (*encoder_context.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder_context
            .open_as(codec)
            .map_err(|e| ToonifyError::Mux(format!("cannot open audio encoder: {e}")))?;

        Ok((encoder, time_base))
    }
}

/// Uniquely named sibling file the muxed container is staged in. It keeps
/// the extension so the container format is inferred the same way.
fn staging_file_for(path: &Path) -> Result<NamedTempFile, ToonifyError> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let suffix = path
        .extension()
        .map(|extension| format!(".{}", extension.to_string_lossy()))
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&format!(".{stem}.muxing-"))
        .suffix(&suffix)
        .tempfile_in(directory)
        .map_err(|error| {
            ToonifyError::Mux(format!("cannot stage muxed output in {directory:?}: {error}"))
        })
}

fn output_time_base(output: &Output, index: usize) -> Result<Rational, ToonifyError> {
    output
        .stream(index)
        .map(|stream| stream.time_base())
        .ok_or_else(|| ToonifyError::Mux(format!("output stream {index} vanished")))
}

/// The decoder's rate if the encoder supports it, otherwise the closest
/// supported rate.
fn pick_sample_rate(codec: &Codec, preferred: u32) -> u32 {
    let Some(rates) = codec.audio().ok().and_then(|audio| audio.rates()) else {
        return preferred;
    };
    rates
        .map(|rate| rate as u32)
        .min_by_key(|&rate| rate.abs_diff(preferred))
        .unwrap_or(preferred)
}

/// Build the resampler from the first decoded frame's actual properties.
fn resampler_for<'r>(
    slot: &'r mut Option<ResamplingContext>,
    decoded: &mut AudioFrame,
    state: &AudioState<'_>,
) -> Result<&'r mut ResamplingContext, ToonifyError> {
    if decoded.channel_layout().is_empty() {
        decoded.set_channel_layout(ChannelLayout::default(decoded.channels() as i32));
    }
    if slot.is_none() {
        let resampler = ResamplingContext::get(
            decoded.format(),
            decoded.channel_layout(),
            decoded.rate(),
            state.fifo.format,
            state.fifo.layout,
            state.fifo.rate,
        )
        .map_err(|e| ToonifyError::Mux(format!("cannot create resampler: {e}")))?;
        *slot = Some(resampler);
    }
    slot.as_mut()
        .ok_or_else(|| ToonifyError::Mux("resampler unavailable".to_string()))
}

/// Encoder-side state of one mux.
struct AudioState<'e> {
    encoder: &'e mut AudioEncoder,
    encoder_time_base: Rational,
    audio_out_time_base: Rational,
    fifo: SampleFifo,
    frame_size: usize,
    /// Samples accepted into the FIFO so far (capped at `sample_limit`).
    samples_buffered: u64,
    /// Samples handed to the encoder so far; also the next frame's PTS.
    samples_encoded: u64,
    sample_limit: u64,
}

impl AudioState<'_> {
    fn is_full(&self) -> bool {
        self.samples_buffered >= self.sample_limit
    }

    fn push_decoded(
        &mut self,
        resampler: &mut ResamplingContext,
        decoded: &AudioFrame,
    ) -> Result<(), ToonifyError> {
        // Room for every converted sample plus whatever the resampler buffered.
        let capacity = (decoded.samples() as u64 * self.fifo.rate as u64)
            .div_ceil(decoded.rate().max(1) as u64) as usize
            + FALLBACK_FRAME_SIZE;
        let mut resampled = self.fifo.allocate(capacity);
        resampler
            .run(decoded, &mut resampled)
            .map_err(|e| ToonifyError::Mux(format!("resampling failed: {e}")))?;
        self.push_resampled(&resampled)
    }

    fn push_resampled(&mut self, resampled: &AudioFrame) -> Result<(), ToonifyError> {
        let room = self.sample_limit.saturating_sub(self.samples_buffered) as usize;
        let accepted = self.fifo.push(resampled, room)?;
        self.samples_buffered += accepted as u64;
        Ok(())
    }

    fn encode_full_frames(
        &mut self,
        output: &mut Output,
        video_queue: &mut VideoQueue,
        tracker: &mut ProgressTracker,
    ) -> Result<(), ToonifyError> {
        while self.fifo.samples >= self.frame_size {
            let frame = self.fifo.pop(self.frame_size)?;
            self.encode_frame(&frame, output, video_queue)?;
            tracker.advance(None);
        }
        Ok(())
    }

    /// Encode whatever is left (a short final frame is allowed) and flush.
    fn encode_remaining(
        &mut self,
        output: &mut Output,
        video_queue: &mut VideoQueue,
        tracker: &mut ProgressTracker,
    ) -> Result<(), ToonifyError> {
        self.encode_full_frames(output, video_queue, tracker)?;
        if self.fifo.samples > 0 {
            let frame = self.fifo.pop(self.fifo.samples)?;
            self.encode_frame(&frame, output, video_queue)?;
            tracker.advance(None);
        }
        self.encoder
            .send_eof()
            .map_err(|e| ToonifyError::Mux(format!("cannot flush audio encoder: {e}")))?;
        self.drain(output, video_queue)
    }

    fn encode_frame(
        &mut self,
        frame: &AudioFrame,
        output: &mut Output,
        video_queue: &mut VideoQueue,
    ) -> Result<(), ToonifyError> {
        let mut frame = frame.clone();
        frame.set_pts(Some(self.samples_encoded as i64));
        self.samples_encoded += frame.samples() as u64;
        self.encoder
            .send_frame(&frame)
            .map_err(|e| ToonifyError::Mux(format!("cannot encode audio: {e}")))?;
        self.drain(output, video_queue)
    }

    fn drain(
        &mut self,
        output: &mut Output,
        video_queue: &mut VideoQueue,
    ) -> Result<(), ToonifyError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(1);
            packet.rescale_ts(self.encoder_time_base, self.audio_out_time_base);
            let audio_time = packet
                .dts()
                .or(packet.pts())
                .map(|ts| pts_to_duration(ts, self.audio_out_time_base));
            if let Some(audio_time) = audio_time {
                video_queue.write_until(output, audio_time)?;
            }
            packet
                .write_interleaved(output)
                .map_err(|e| ToonifyError::Mux(format!("cannot write audio packet: {e}")))?;
        }
        Ok(())
    }
}

/// Copied video packets waiting to be interleaved with the audio.
struct VideoQueue {
    packets: VecDeque<Packet>,
    time_base: Rational,
}

impl VideoQueue {
    /// Write every queued packet stamped at or before `limit`.
    fn write_until(
        &mut self,
        output: &mut Output,
        limit: std::time::Duration,
    ) -> Result<(), ToonifyError> {
        while let Some(packet) = self.packets.front() {
            let stamp = packet
                .dts()
                .or(packet.pts())
                .map(|ts| pts_to_duration(ts, self.time_base))
                .unwrap_or_default();
            if stamp > limit {
                break;
            }
            if let Some(mut packet) = self.packets.pop_front() {
                packet
                    .write_interleaved(output)
                    .map_err(|e| ToonifyError::Mux(format!("cannot write video packet: {e}")))?;
            }
        }
        Ok(())
    }

    fn write_all(&mut self, output: &mut Output) -> Result<(), ToonifyError> {
        while let Some(mut packet) = self.packets.pop_front() {
            packet
                .write_interleaved(output)
                .map_err(|e| ToonifyError::Mux(format!("cannot write video packet: {e}")))?;
        }
        Ok(())
    }
}

/// Byte-level sample queue that regroups resampled audio into frames of
/// the size the encoder demands.
struct SampleFifo {
    format: Sample,
    layout: ChannelLayout,
    rate: u32,
    /// One buffer per plane: per channel when planar, a single one when packed.
    planes: Vec<Vec<u8>>,
    /// Bytes one sample occupies in one plane.
    unit: usize,
    samples: usize,
}

impl SampleFifo {
    fn new(format: Sample, layout: ChannelLayout, rate: u32) -> Self {
        let channels = layout.channels().max(1) as usize;
        let (plane_count, unit) = if format.is_planar() {
            (channels, format.bytes())
        } else {
            (1, format.bytes() * channels)
        };
        Self {
            format,
            layout,
            rate,
            planes: vec![Vec::new(); plane_count],
            unit,
            samples: 0,
        }
    }

    /// Append up to `max` samples of `frame`; returns how many were taken.
    fn push(&mut self, frame: &AudioFrame, max: usize) -> Result<usize, ToonifyError> {
        let count = frame.samples().min(max);
        if count == 0 {
            return Ok(0);
        }
        let bytes = count * self.unit;
        for (index, plane) in self.planes.iter_mut().enumerate() {
            plane.extend_from_slice(plane_bytes(frame, index, bytes)?);
        }
        self.samples += count;
        Ok(count)
    }

    /// A frame in the queue's format with room for `samples` samples.
    fn allocate(&self, samples: usize) -> AudioFrame {
        let mut frame = AudioFrame::new(self.format, samples, self.layout);
        frame.set_rate(self.rate);
        frame
    }

    /// Remove the oldest `count` samples as a new frame.
    fn pop(&mut self, count: usize) -> Result<AudioFrame, ToonifyError> {
        let count = count.min(self.samples);
        let mut frame = self.allocate(count);
        let bytes = count * self.unit;
        for (index, plane) in self.planes.iter_mut().enumerate() {
            plane_bytes_mut(&mut frame, index, bytes)?.copy_from_slice(&plane[..bytes]);
            plane.drain(..bytes);
        }
        self.samples -= count;
        Ok(frame)
    }
}

/// The first `bytes` bytes of plane `index`.
///
/// `frame::Audio::data` sizes every plane by its own `linesize`, but FFmpeg
/// only fills `linesize[0]` for audio; all planes share that size.
fn plane_bytes(frame: &AudioFrame, index: usize, bytes: usize) -> Result<&[u8], ToonifyError> {
    let pointer = plane_pointer(frame, index, bytes)?;
    // SAFETY: `plane_pointer` checked the plane exists and holds `bytes`
    // bytes; the slice borrows `frame`.
    Ok(unsafe { std::slice::from_raw_parts(pointer, bytes) })
}

fn plane_bytes_mut(
    frame: &mut AudioFrame,
    index: usize,
    bytes: usize,
) -> Result<&mut [u8], ToonifyError> {
    let pointer = plane_pointer(frame, index, bytes)?;
    // SAFETY: as above, and the slice borrows `frame` mutably.
    Ok(unsafe { std::slice::from_raw_parts_mut(pointer, bytes) })
}

fn plane_pointer(frame: &AudioFrame, index: usize, bytes: usize) -> Result<*mut u8, ToonifyError> {
    let planes = if frame.is_planar() {
        frame.channels() as usize
    } else {
        1
    };
    unsafe {
        let raw = frame.as_ptr();
        let size = (*raw).linesize[0].max(0) as usize;
        if index >= planes || (*raw).extended_data.is_null() || bytes > size {
            return Err(ToonifyError::Mux(format!(
                "audio plane {index} cannot hold {bytes} bytes"
            )));
        }
        let pointer = *(*raw).extended_data.add(index);
        if pointer.is_null() {
            return Err(ToonifyError::Mux(format!("audio plane {index} is not allocated")));
        }
        Ok(pointer)
    }
}
