//! Frame replication.
//!
//! [`FrameMaterializer`] writes `count` identical copies of a stylized frame
//! into a [`FrameStore`] and hands back a [`FrameSequence`]: a verified,
//! zero-indexed view over those artifacts in playback order.
//!
//! # Example
//!
//! ```no_run
//! use toonify::{FrameMaterializer, MemoryFrameStore, ToonifyError};
//!
//! let frame = toonify::load_source_image("cartoon.png")?;
//! let mut store = MemoryFrameStore::new();
//! let sequence = FrameMaterializer::new().materialize(&frame, 144, &mut store)?;
//! assert_eq!(sequence.len(), 144);
//! # Ok::<(), ToonifyError>(())
//! ```

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat};

use crate::configuration::PipelineOptions;
use crate::error::ToonifyError;
use crate::frame_store::{FrameStore, frame_file_name};
use crate::progress::{OperationType, ProgressTracker};

/// Writes replicated frames into a store.
#[derive(Debug, Clone, Default)]
pub struct FrameMaterializer {
    options: PipelineOptions,
}

impl FrameMaterializer {
    /// A materializer without progress reporting or cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given run options for progress and cancellation.
    pub fn with_options(options: PipelineOptions) -> Self {
        Self { options }
    }

    /// Store `count` PNG-encoded copies of `frame` under indices
    /// `0..count`, in order.
    ///
    /// `count == 0` is legal and yields an empty sequence.
    ///
    /// # Errors
    ///
    /// - [`ToonifyError::Write`] if an artifact cannot be persisted.
    /// - [`ToonifyError::Cancelled`] if the run was cancelled mid-way.
    /// - [`ToonifyError::SequenceIntegrity`] if the store ends up holding
    ///   anything other than exactly `0..count` (e.g. stale artifacts).
    pub fn materialize<'s>(
        &self,
        frame: &DynamicImage,
        count: u64,
        store: &'s mut dyn FrameStore,
    ) -> Result<FrameSequence<'s>, ToonifyError> {
        log::info!(
            "Materializing {count} frame(s) of {}x{}",
            frame.width(),
            frame.height(),
        );

        let mut encoded = Vec::new();
        frame.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::Materializing,
            Some(count),
            self.options.batch_size,
        );

        for index in 0..count {
            self.options.check_cancelled()?;
            store.put(index, &encoded)?;
            tracker.advance(Some(index));
        }
        tracker.finish();

        let sequence = FrameSequence {
            store: &*store,
            len: count,
        };
        sequence.verify()?;
        Ok(sequence)
    }
}

/// An ordered, zero-indexed run of frame artifacts in a store.
pub struct FrameSequence<'s> {
    store: &'s dyn FrameStore,
    len: u64,
}

impl<'s> FrameSequence<'s> {
    /// View everything already in `store` as a sequence.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::SequenceIntegrity`] if the stored indices are not
    /// exactly `0..n`.
    pub fn from_store(store: &'s dyn FrameStore) -> Result<Self, ToonifyError> {
        let sequence = Self {
            store,
            len: store.len()?,
        };
        sequence.verify()?;
        Ok(sequence)
    }

    /// Number of frames.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the sequence has no frames.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check that the store holds exactly the indices `0..len`.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::SequenceIntegrity`] naming the first index that is
    /// missing, out of place, or beyond the declared length.
    pub fn verify(&self) -> Result<(), ToonifyError> {
        let indices = self.store.indices()?;
        for (position, &index) in indices.iter().enumerate() {
            let expected = position as u64;
            if expected >= self.len {
                return Err(ToonifyError::SequenceIntegrity {
                    expected: self.len,
                    found: format!("unexpected index {index} beyond length {}", self.len),
                });
            }
            if index != expected {
                return Err(ToonifyError::SequenceIntegrity {
                    expected,
                    found: format!("index {index}"),
                });
            }
        }
        if (indices.len() as u64) < self.len {
            return Err(ToonifyError::SequenceIntegrity {
                expected: indices.len() as u64,
                found: "end of sequence".to_string(),
            });
        }
        Ok(())
    }

    /// Encoded bytes of frame `index`.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::MissingFrame`] if `index` is out of range or absent.
    pub fn frame_bytes(&self, index: u64) -> Result<Vec<u8>, ToonifyError> {
        if index >= self.len {
            return Err(ToonifyError::MissingFrame(index));
        }
        self.store.get(index)
    }

    /// Decoded frame `index`.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::MissingFrame`] if absent, [`ToonifyError::Decode`]
    /// if the artifact is corrupt.
    pub fn frame(&self, index: u64) -> Result<DynamicImage, ToonifyError> {
        let bytes = self.frame_bytes(index)?;
        image::load_from_memory_with_format(&bytes, ImageFormat::Png).map_err(|error| {
            ToonifyError::Decode {
                path: PathBuf::from(frame_file_name(index, self.len)),
                reason: error.to_string(),
            }
        })
    }

    /// Decoded frames in playback order.
    pub fn frames(&self) -> impl Iterator<Item = Result<DynamicImage, ToonifyError>> + '_ {
        (0..self.len).map(move |index| self.frame(index))
    }
}
