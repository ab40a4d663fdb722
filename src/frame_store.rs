//! Indexed storage for encoded frame artifacts.
//!
//! A [`FrameStore`] maps a zero-based frame index to the encoded bytes of
//! that frame. [`DirectoryFrameStore`] keeps one PNG file per index inside a
//! workspace; [`MemoryFrameStore`] keeps the buffers in a map, which lets
//! the rest of the pipeline run without touching the filesystem.
//!
//! File names use a zero-padded index at least three digits wide that grows
//! with the sequence length (see [`frame_file_name`]), so names never wrap
//! or collide and lexical order equals playback order.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::error::ToonifyError;

const FRAME_PREFIX: &str = "frame_";
const FRAME_EXTENSION: &str = "png";
const MIN_INDEX_WIDTH: usize = 3;

/// Ordered `(index, bytes)` pairs yielded by [`FrameStore::iterate`].
pub type FrameEntries<'a> = Box<dyn Iterator<Item = Result<(u64, Vec<u8>), ToonifyError>> + 'a>;

/// Index-addressed storage for encoded frames.
pub trait FrameStore {
    /// Store `bytes` under `index`, replacing any previous artifact.
    fn put(&mut self, index: u64, bytes: &[u8]) -> Result<(), ToonifyError>;

    /// Fetch the artifact stored under `index`.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::MissingFrame`] if nothing is stored there.
    fn get(&self, index: u64) -> Result<Vec<u8>, ToonifyError>;

    /// All stored indices in ascending order.
    fn indices(&self) -> Result<Vec<u64>, ToonifyError>;

    /// Number of stored artifacts.
    fn len(&self) -> Result<u64, ToonifyError> {
        Ok(self.indices()?.len() as u64)
    }

    /// Whether the store holds no artifacts.
    fn is_empty(&self) -> Result<bool, ToonifyError> {
        Ok(self.len()? == 0)
    }

    /// Every stored artifact in ascending index order.
    fn iterate(&self) -> Result<FrameEntries<'_>, ToonifyError> {
        let indices = self.indices()?;
        Ok(Box::new(
            indices
                .into_iter()
                .map(move |index| self.get(index).map(|bytes| (index, bytes))),
        ))
    }
}

/// Width of the zero-padded index for a sequence of `count` frames.
///
/// At least three digits, widened so the last index `count - 1` fits.
///
/// ```
/// assert_eq!(toonify::index_width(144), 3);
/// assert_eq!(toonify::index_width(1000), 3);
/// assert_eq!(toonify::index_width(1001), 4);
/// ```
pub fn index_width(count: u64) -> usize {
    let last = count.saturating_sub(1);
    let digits = last.checked_ilog10().map_or(1, |log| log as usize + 1);
    digits.max(MIN_INDEX_WIDTH)
}

/// File name of frame `index` in a sequence of `count` frames.
///
/// ```
/// assert_eq!(toonify::frame_file_name(7, 144), "frame_007.png");
/// assert_eq!(toonify::frame_file_name(1234, 1800), "frame_1234.png");
/// ```
pub fn frame_file_name(index: u64, count: u64) -> String {
    let width = index_width(count.max(index.saturating_add(1)));
    format!("{FRAME_PREFIX}{index:0width$}.{FRAME_EXTENSION}")
}

/// Parse the index out of a name produced by [`frame_file_name`].
fn parse_frame_file_name(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_EXTENSION)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Frames stored as individual files in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryFrameStore {
    root: PathBuf,
    capacity: u64,
}

impl DirectoryFrameStore {
    /// A store in `root` sized for `capacity` frames.
    ///
    /// The capacity only fixes the index width of the file names; storing
    /// beyond it still works, with wider names.
    pub fn new<P: AsRef<Path>>(root: P, capacity: u64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            capacity,
        }
    }

    /// The directory holding the artifacts.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact for `index`.
    pub fn path_for(&self, index: u64) -> PathBuf {
        self.root.join(frame_file_name(index, self.capacity))
    }
}

impl FrameStore for DirectoryFrameStore {
    fn put(&mut self, index: u64, bytes: &[u8]) -> Result<(), ToonifyError> {
        let path = self.path_for(index);
        fs::write(&path, bytes).map_err(|error| ToonifyError::Write {
            path,
            reason: error.to_string(),
        })
    }

    fn get(&self, index: u64) -> Result<Vec<u8>, ToonifyError> {
        match fs::read(self.path_for(index)) {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                Err(ToonifyError::MissingFrame(index))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn indices(&self) -> Result<Vec<u64>, ToonifyError> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(index) = entry.file_name().to_str().and_then(parse_frame_file_name) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }
}

/// Frames stored as in-memory buffers.
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameStore {
    frames: BTreeMap<u64, Vec<u8>>,
}

impl MemoryFrameStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the artifact at `index`, returning it if present.
    pub fn remove(&mut self, index: u64) -> Option<Vec<u8>> {
        self.frames.remove(&index)
    }
}

impl FrameStore for MemoryFrameStore {
    fn put(&mut self, index: u64, bytes: &[u8]) -> Result<(), ToonifyError> {
        self.frames.insert(index, bytes.to_vec());
        Ok(())
    }

    fn get(&self, index: u64) -> Result<Vec<u8>, ToonifyError> {
        self.frames
            .get(&index)
            .cloned()
            .ok_or(ToonifyError::MissingFrame(index))
    }

    fn indices(&self) -> Result<Vec<u64>, ToonifyError> {
        Ok(self.frames.keys().copied().collect())
    }

    fn len(&self) -> Result<u64, ToonifyError> {
        Ok(self.frames.len() as u64)
    }
}
