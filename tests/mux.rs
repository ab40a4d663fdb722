//! Audio muxer integration tests.
//!
//! Skipped when the local FFmpeg build lacks an H.264 or AAC encoder.

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use toonify::{
    AudioMuxOptions, AudioMuxer, MediaProbe, StylizeOptions, Stylizer, ToonifyError, VideoEncoder,
    VideoEncoderOptions, VideoStream,
};

/// Encode a four-second, 12 fps video into a fresh directory.
fn encode_video(directory: &TempDir) -> Option<VideoStream> {
    let frame = Stylizer::new(StylizeOptions::default()).stylize(&common::sample_image(64, 48));
    let output = directory.path().join("clip.mp4");
    match VideoEncoder::new(VideoEncoderOptions::default().fps(12)).encode_repeated(
        &frame,
        48,
        &output,
    ) {
        Ok(video) => Some(video),
        Err(ref error) if common::encoder_unavailable(error) => None,
        Err(error) => panic!("encode failed: {error}"),
    }
}

fn wav(directory: &TempDir, name: &str, seconds: f64, channels: u16) -> PathBuf {
    let path = directory.path().join(name);
    common::write_wav(&path, seconds, 44_100, channels);
    path
}

fn attach(video: &VideoStream, audio: &Path) -> Option<Result<VideoStream, ToonifyError>> {
    let result = AudioMuxer::new(AudioMuxOptions::default()).attach(video, Some(audio));
    match result {
        Err(ref error) if common::encoder_unavailable(error) => None,
        other => Some(other),
    }
}

#[test]
fn absent_audio_is_a_pass_through() {
    let directory = tempfile::tempdir().unwrap();
    let Some(video) = encode_video(&directory) else {
        return;
    };
    let before = fs::read(&video.path).unwrap();

    let muxer = AudioMuxer::new(AudioMuxOptions::default());
    assert_eq!(muxer.attach(&video, None).unwrap(), video);
    assert_eq!(muxer.attach(&video, Some(Path::new(""))).unwrap(), video);
    assert_eq!(fs::read(&video.path).unwrap(), before);
}

#[test]
fn long_audio_is_truncated_to_the_video() {
    let directory = tempfile::tempdir().unwrap();
    let Some(video) = encode_video(&directory) else {
        return;
    };
    let audio = wav(&directory, "long.wav", 10.0, 2);

    let Some(result) = attach(&video, &audio) else {
        return;
    };
    let muxed = result.expect("mux long audio");
    assert!(muxed.has_audio);
    assert_eq!(muxed.frame_count, video.frame_count);
    assert_eq!(muxed.path, video.path);

    let info = MediaProbe::probe(&muxed.path).expect("probe muxed");
    let video_info = info.video.expect("video stream");
    let audio_info = info.audio.expect("audio stream");
    assert!((video_info.duration.as_secs_f64() - 4.0).abs() < 0.1);
    // AAC priming and frame padding may add a few milliseconds.
    assert!(
        audio_info.duration.as_secs_f64() <= 4.1,
        "audio ran {:?}",
        audio_info.duration
    );
    assert!(info.duration.as_secs_f64() < 4.2, "container ran {:?}", info.duration);
}

#[test]
fn short_audio_leaves_a_silent_tail() {
    let directory = tempfile::tempdir().unwrap();
    let Some(video) = encode_video(&directory) else {
        return;
    };
    let audio = wav(&directory, "short.wav", 1.5, 1);

    let Some(result) = attach(&video, &audio) else {
        return;
    };
    let muxed = result.expect("mux short audio");

    let info = MediaProbe::probe(&muxed.path).expect("probe muxed");
    let video_info = info.video.expect("video stream");
    let audio_info = info.audio.expect("audio stream");
    assert!((video_info.duration.as_secs_f64() - 4.0).abs() < 0.1);
    assert!(audio_info.duration.as_secs_f64() < 2.0, "audio ran {:?}", audio_info.duration);
    assert_eq!(audio_info.channels, 1);
}

#[test]
fn undecodable_audio_keeps_the_original() {
    let directory = tempfile::tempdir().unwrap();
    let Some(video) = encode_video(&directory) else {
        return;
    };
    let before = fs::read(&video.path).unwrap();
    let bogus = directory.path().join("song.mp3");
    fs::write(&bogus, b"this is not an audio file at all").unwrap();

    let error = AudioMuxer::new(AudioMuxOptions::default())
        .attach(&video, Some(bogus.as_path()))
        .unwrap_err();
    assert!(matches!(error, ToonifyError::Mux(_)));
    assert_eq!(fs::read(&video.path).unwrap(), before);

    // No staging file is left next to the output.
    let names = common::entries(directory.path());
    assert_eq!(names, vec!["clip.mp4".to_string(), "song.mp3".to_string()]);
}

#[test]
fn missing_audio_file_is_a_mux_error() {
    let directory = tempfile::tempdir().unwrap();
    let Some(video) = encode_video(&directory) else {
        return;
    };
    let error = AudioMuxer::new(AudioMuxOptions::default())
        .attach(&video, Some(directory.path().join("absent.wav").as_path()))
        .unwrap_err();
    assert!(matches!(error, ToonifyError::Mux(_)));
    assert!(video.path.exists());
}
