//! Error type behaviour.

use std::io::{Error as IoError, ErrorKind};
use std::path::PathBuf;

use toonify::ToonifyError;

#[test]
fn messages_name_the_failing_stage() {
    let decode = ToonifyError::Decode {
        path: PathBuf::from("photo.jpg"),
        reason: "truncated".to_string(),
    };
    let message = decode.to_string();
    assert!(message.contains("decode"), "{message}");
    assert!(message.contains("photo.jpg"), "{message}");
    assert!(message.contains("truncated"), "{message}");

    let write = ToonifyError::Write {
        path: PathBuf::from("frames/frame_004.png"),
        reason: "disk full".to_string(),
    };
    assert!(write.to_string().contains("frame_004.png"));

    let integrity = ToonifyError::SequenceIntegrity {
        expected: 3,
        found: "index 4".to_string(),
    };
    assert!(integrity.to_string().contains("expected index 3"));

    assert!(ToonifyError::MissingFrame(17).to_string().contains("17"));
    assert!(ToonifyError::Encode("boom".into()).to_string().contains("encoding"));
    assert!(ToonifyError::Mux("boom".into()).to_string().contains("mux"));
    assert!(ToonifyError::Config("fps".into()).to_string().contains("configuration"));
    assert_eq!(ToonifyError::Cancelled.to_string(), "Operation cancelled");
}

#[test]
fn io_errors_convert() {
    fn fails() -> Result<(), ToonifyError> {
        Err(IoError::new(ErrorKind::PermissionDenied, "nope"))?;
        Ok(())
    }
    let error = fails().unwrap_err();
    assert!(matches!(error, ToonifyError::Io(_)));
    assert!(error.to_string().contains("nope"));
}

#[test]
fn image_errors_convert() {
    fn fails() -> Result<(), ToonifyError> {
        image::load_from_memory(b"not an image")?;
        Ok(())
    }
    assert!(matches!(fails().unwrap_err(), ToonifyError::Image(_)));
}

#[test]
fn ffmpeg_errors_convert() {
    let error: ToonifyError = ffmpeg_next::Error::Eof.into();
    assert!(matches!(error, ToonifyError::Ffmpeg(_)));
}

#[test]
fn errors_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync + 'static>() {}
    assert_send_sync::<ToonifyError>();
}

#[test]
fn error_source_is_preserved() {
    use std::error::Error;

    let error = ToonifyError::from(IoError::other("inner"));
    assert!(error.source().is_some());
}
