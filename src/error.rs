//! Error types for the `toonify` crate.
//!
//! This module defines [`ToonifyError`], the unified error type returned by
//! every fallible operation in the crate. Each variant names the pipeline
//! stage that failed and carries the offending path or parameter.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `toonify` operations.
///
/// All variants are fatal to a run. The pipeline never retries; the only
/// recovery it performs is tearing down the frame workspace before the
/// error reaches the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToonifyError {
    /// The source image could not be opened or decoded.
    #[error("Failed to decode image at {path}: {reason}")]
    Decode {
        /// Path that was passed to [`crate::load_source_image`].
        path: PathBuf,
        /// Underlying reason the decode failed.
        reason: String,
    },

    /// A frame artifact could not be persisted.
    #[error("Failed to write frame artifact {path}: {reason}")]
    Write {
        /// Artifact path (or a synthetic `memory://` name for in-memory stores).
        path: PathBuf,
        /// Underlying reason the write failed.
        reason: String,
    },

    /// The frame sequence has a gap or does not match its declared length.
    #[error("Frame sequence integrity violated: expected index {expected}, found {found}")]
    SequenceIntegrity {
        /// The index the encoder expected next.
        expected: u64,
        /// What the store actually holds at that position.
        found: String,
    },

    /// A frame index was requested that the store does not hold.
    #[error("Frame {0} is missing from the frame store")]
    MissingFrame(u64),

    /// The video sink could not be opened, written, or finalized.
    #[error("Video encoding error: {0}")]
    Encode(String),

    /// The audio track could not be decoded or muxed into the video.
    #[error("Audio mux error: {0}")]
    Mux(String),

    /// A run parameter is invalid (duration, frame rate, or path).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The run was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while encoding or decoding a frame.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for ToonifyError {
    fn from(error: FfmpegError) -> Self {
        ToonifyError::Ffmpeg(error.to_string())
    }
}
