//! Video encoder integration tests.
//!
//! Tests that need an H.264 encoder skip when the local FFmpeg build has
//! none.

mod common;

use std::path::Path;

use image::{DynamicImage, GrayImage, Luma};
use toonify::{
    CancellationToken, DirectoryFrameStore, FrameMaterializer, FrameSequence, MediaProbe,
    MemoryFrameStore, PipelineOptions, StylizeOptions, Stylizer, ToonifyError, VideoEncoder,
    VideoEncoderOptions,
};

fn stylized_frame(width: u32, height: u32) -> DynamicImage {
    Stylizer::new(StylizeOptions::default()).stylize(&common::sample_image(width, height))
}

fn encoder(fps: u32) -> VideoEncoder {
    VideoEncoder::new(VideoEncoderOptions::default().fps(fps))
}

#[test]
fn sequence_duration_is_count_over_fps() {
    let directory = tempfile::tempdir().unwrap();
    let frames = directory.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    let output = directory.path().join("clip.mp4");

    let mut store = DirectoryFrameStore::new(&frames, 24);
    let sequence = FrameMaterializer::new()
        .materialize(&stylized_frame(64, 48), 24, &mut store)
        .unwrap();

    let result = encoder(12).encode(&sequence, &output);
    if let Err(ref error) = result {
        if common::encoder_unavailable(error) {
            return;
        }
    }
    let video = result.expect("encode sequence");

    assert_eq!(video.frame_count, 24);
    assert_eq!(video.fps, 12);
    assert_eq!((video.width, video.height), (64, 48));
    assert!(!video.has_audio);
    assert_eq!(video.duration().as_secs_f64(), 2.0);

    let info = MediaProbe::probe(&output).expect("probe output");
    let stream = info.video.expect("video stream");
    assert_eq!((stream.width, stream.height), (64, 48));
    assert!((stream.duration.as_secs_f64() - 2.0).abs() < 0.1, "{:?}", stream.duration);
    assert!(info.audio.is_none());
}

#[test]
fn repeated_frame_matches_materialized_sequence_length() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("direct.mp4");

    let result = encoder(10).encode_repeated(&stylized_frame(40, 30), 15, &output);
    if let Err(ref error) = result {
        if common::encoder_unavailable(error) {
            return;
        }
    }
    let video = result.expect("encode repeated frame");
    assert_eq!(video.frame_count, 15);

    let info = MediaProbe::probe(&output).expect("probe output");
    let stream = info.video.expect("video stream");
    assert!((stream.duration.as_secs_f64() - 1.5).abs() < 0.1, "{:?}", stream.duration);
}

#[test]
fn odd_dimensions_are_cropped_to_even() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("odd.mp4");

    let result = encoder(5).encode_repeated(&stylized_frame(33, 21), 5, &output);
    if let Err(ref error) = result {
        if common::encoder_unavailable(error) {
            return;
        }
    }
    let video = result.expect("encode odd frame");
    assert_eq!((video.width, video.height), (32, 20));
}

#[test]
fn empty_sequence_is_rejected() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("empty.mp4");
    let store = MemoryFrameStore::new();
    let sequence = FrameSequence::from_store(&store).unwrap();

    let error = encoder(24).encode(&sequence, &output).unwrap_err();
    assert!(matches!(error, ToonifyError::Encode(_)));
    assert!(!output.exists());

    let error = encoder(24)
        .encode_repeated(&stylized_frame(16, 16), 0, &output)
        .unwrap_err();
    assert!(matches!(error, ToonifyError::Encode(_)));
}

#[test]
fn zero_fps_is_a_configuration_error() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("zero.mp4");
    let error = encoder(0)
        .encode_repeated(&stylized_frame(16, 16), 3, &output)
        .unwrap_err();
    assert!(matches!(error, ToonifyError::Config(_)));
    assert!(!output.exists());
}

#[test]
fn tiny_frames_are_rejected() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("tiny.mp4");
    let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([9])));
    let error = encoder(24).encode_repeated(&frame, 3, &output).unwrap_err();
    assert!(matches!(error, ToonifyError::Encode(_)));
}

#[test]
fn unwritable_sink_is_an_encode_error() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("no").join("such").join("dir.mp4");
    let error = encoder(24)
        .encode_repeated(&stylized_frame(16, 16), 3, &output)
        .unwrap_err();
    assert!(matches!(error, ToonifyError::Encode(_)));
    assert!(!Path::new(&output).exists());
}

#[test]
fn cancelled_encode_removes_partial_output() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("cancelled.mp4");
    let token = CancellationToken::new();
    token.cancel();

    let result = VideoEncoder::new(VideoEncoderOptions::default())
        .with_options(PipelineOptions::new().with_cancellation(token))
        .encode_repeated(&stylized_frame(32, 32), 48, &output);

    match result {
        Err(ToonifyError::Cancelled) => assert!(!output.exists()),
        Err(ref error) if common::encoder_unavailable(error) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
}
