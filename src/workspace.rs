//! Scoped storage for intermediate frame artifacts.
//!
//! A [`Workspace`] owns a directory for the lifetime of one run. It is
//! created (or reused, if it already exists) up front and purged when the
//! guard is closed or dropped, so an early `?` return, a panic, or a
//! cancelled run never leaves frame files behind.
//!
//! # Example
//!
//! ```no_run
//! use toonify::{ToonifyError, Workspace};
//!
//! let workspace = Workspace::temporary_in(".")?;
//! std::fs::write(workspace.path().join("scratch.bin"), b"...")?;
//! workspace.close()?; // or just let it drop
//! # Ok::<(), ToonifyError>(())
//! ```

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::error::ToonifyError;

/// Directory-name prefix used by [`Workspace::temporary_in`].
const TEMPORARY_PREFIX: &str = ".toonify-frames-";

/// A transient directory torn down at the end of its scope.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    /// Set for uniquely named workspaces; removal goes through the guard.
    temporary: Option<TempDir>,
    released: bool,
}

impl Workspace {
    /// Create the workspace at `path`, reusing it if it already exists.
    ///
    /// Existing contents are left untouched; creating the same workspace
    /// twice is not an error.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::Write`] if the directory cannot be created (for
    /// example because a regular file occupies `path`).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ToonifyError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path).map_err(|error| ToonifyError::Write {
            path: path.clone(),
            reason: format!("cannot create workspace: {error}"),
        })?;
        log::debug!("Workspace ready at {:?}", path);
        Ok(Self {
            path,
            temporary: None,
            released: false,
        })
    }

    /// Create a fresh, uniquely named workspace inside `parent`.
    ///
    /// # Errors
    ///
    /// [`ToonifyError::Write`] if no directory could be created.
    pub fn temporary_in<P: AsRef<Path>>(parent: P) -> Result<Self, ToonifyError> {
        let parent = parent.as_ref();
        let directory = tempfile::Builder::new()
            .prefix(TEMPORARY_PREFIX)
            .tempdir_in(parent)
            .map_err(|error| ToonifyError::Write {
                path: parent.to_path_buf(),
                reason: format!("cannot create workspace: {error}"),
            })?;
        let path = directory.path().to_path_buf();
        log::debug!("Temporary workspace created at {:?}", path);
        Ok(Self {
            path,
            temporary: Some(directory),
            released: false,
        })
    }

    /// The workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Purge and remove the workspace, reporting any failure.
    ///
    /// Dropping the guard does the same but can only log failures.
    pub fn close(mut self) -> Result<(), ToonifyError> {
        self.released = true;
        self.remove().map_err(|error| ToonifyError::Write {
            path: self.path.clone(),
            reason: format!("cannot remove workspace: {error}"),
        })
    }

    fn remove(&mut self) -> std::io::Result<()> {
        let result = match self.temporary.take() {
            Some(directory) => directory.close(),
            None => fs::remove_dir_all(&self.path),
        };
        match result {
            Ok(()) => {
                log::debug!("Workspace {:?} removed", self.path);
                Ok(())
            }
            // Already gone counts as removed.
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(error) = self.remove() {
            log::warn!("Failed to remove workspace {:?}: {error}", self.path);
        }
    }
}
