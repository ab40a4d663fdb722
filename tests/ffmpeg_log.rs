//! FFmpeg log level wrappers.

use toonify::FfmpegLogLevel;

#[test]
fn level_round_trips_through_ffmpeg() {
    toonify::set_ffmpeg_log_level(FfmpegLogLevel::Error);
    assert_eq!(toonify::get_ffmpeg_log_level(), Some(FfmpegLogLevel::Error));

    toonify::set_ffmpeg_log_level(FfmpegLogLevel::Warning);
    assert_eq!(toonify::get_ffmpeg_log_level(), Some(FfmpegLogLevel::Warning));
}

#[test]
fn names_parse_case_insensitively() {
    assert_eq!(FfmpegLogLevel::parse("TRACE"), Some(FfmpegLogLevel::Trace));
    assert_eq!(FfmpegLogLevel::parse("warn"), Some(FfmpegLogLevel::Warning));
    assert_eq!(FfmpegLogLevel::parse("shout"), None);
}
