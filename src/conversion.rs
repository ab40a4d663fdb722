//! Internal conversion helpers.
//!
//! Pixel-data copying into FFmpeg frames and timestamp arithmetic shared by
//! the encoder, the muxer, and the probe.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy a tightly-packed RGB24 buffer into an FFmpeg video frame.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3), so
/// the copy is done row by row unless the strides happen to match.
pub(crate) fn rgb_buffer_into_frame(rgb: &[u8], width: u32, height: u32, frame: &mut VideoFrame) {
    let row_len = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data_mut(0);

    if stride == row_len {
        data[..row_len * height as usize].copy_from_slice(&rgb[..row_len * height as usize]);
    } else {
        for row in 0..height as usize {
            let src_start = row * row_len;
            let dst_start = row * stride;
            data[dst_start..dst_start + row_len]
                .copy_from_slice(&rgb[src_start..src_start + row_len]);
        }
    }
}

/// Rescale a timestamp in `time_base` units to a [`Duration`].
///
/// Negative timestamps clamp to zero.
pub(crate) fn pts_to_duration(pts: i64, time_base: Rational) -> Duration {
    let seconds =
        pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    Duration::from_secs_f64(seconds.max(0.0))
}

/// Number of audio samples covering `duration` at `sample_rate`, rounded
/// to the nearest sample.
pub(crate) fn duration_to_samples(duration: Duration, sample_rate: u32) -> u64 {
    (duration.as_secs_f64() * sample_rate as f64).round() as u64
}
