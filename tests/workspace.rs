//! Workspace lifecycle tests.

mod common;

use std::fs;

use toonify::{ToonifyError, Workspace};

#[test]
fn create_is_idempotent() {
    let parent = tempfile::tempdir().unwrap();
    let path = parent.path().join("frames");

    let first = Workspace::create(&path).unwrap();
    fs::write(path.join("keep.txt"), b"x").unwrap();
    // A second guard on the same directory must not fail or clear it.
    let second = Workspace::create(&path).unwrap();
    assert!(path.join("keep.txt").exists());

    second.close().unwrap();
    assert!(!path.exists());
    // Closing after the directory is already gone is not an error.
    first.close().unwrap();
}

#[test]
fn close_removes_contents() {
    let parent = tempfile::tempdir().unwrap();
    let workspace = Workspace::temporary_in(parent.path()).unwrap();
    let path = workspace.path().to_path_buf();
    fs::create_dir(path.join("nested")).unwrap();
    fs::write(path.join("nested").join("frame_000.png"), b"png").unwrap();

    workspace.close().unwrap();
    assert!(!path.exists());
    assert!(common::entries(parent.path()).is_empty());
}

#[test]
fn drop_removes_directory() {
    let parent = tempfile::tempdir().unwrap();
    let path = {
        let workspace = Workspace::temporary_in(parent.path()).unwrap();
        fs::write(workspace.path().join("frame_000.png"), b"png").unwrap();
        workspace.path().to_path_buf()
    };
    assert!(!path.exists());
}

fn failing_stage(workspace: &Workspace) -> Result<(), ToonifyError> {
    fs::write(workspace.path().join("frame_000.png"), b"png")?;
    Err(ToonifyError::Encode("simulated failure".to_string()))
}

#[test]
fn early_return_still_cleans_up() {
    let parent = tempfile::tempdir().unwrap();
    let run = || -> Result<(), ToonifyError> {
        let workspace = Workspace::temporary_in(parent.path())?;
        failing_stage(&workspace)?;
        workspace.close()
    };

    assert!(matches!(run(), Err(ToonifyError::Encode(_))));
    assert!(common::entries(parent.path()).is_empty());
}

#[test]
fn panic_still_cleans_up() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().to_path_buf();
    let result = std::panic::catch_unwind(move || {
        let workspace = Workspace::temporary_in(&root).unwrap();
        fs::write(workspace.path().join("frame_000.png"), b"png").unwrap();
        panic!("stage blew up");
    });

    assert!(result.is_err());
    assert!(common::entries(parent.path()).is_empty());
}

#[test]
fn temporary_workspaces_are_unique() {
    let parent = tempfile::tempdir().unwrap();
    let first = Workspace::temporary_in(parent.path()).unwrap();
    let second = Workspace::temporary_in(parent.path()).unwrap();
    assert_ne!(first.path(), second.path());
    assert!(first.path().starts_with(parent.path()));
}

#[test]
fn file_in_the_way_is_a_write_error() {
    let parent = tempfile::tempdir().unwrap();
    let blocker = parent.path().join("frames");
    fs::write(&blocker, b"not a directory").unwrap();

    let error = Workspace::create(&blocker).unwrap_err();
    assert!(matches!(error, ToonifyError::Write { .. }));
}

#[test]
fn temporary_workspace_is_hidden_and_tolerates_early_removal() {
    let parent = tempfile::tempdir().unwrap();
    let workspace = Workspace::temporary_in(parent.path()).unwrap();
    let name = workspace.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(".toonify-frames-"), "{name}");

    fs::remove_dir_all(workspace.path()).unwrap();
    workspace.close().unwrap();
    assert!(common::entries(parent.path()).is_empty());
}

#[test]
fn missing_parent_is_a_write_error() {
    let parent = tempfile::tempdir().unwrap();
    let error = Workspace::temporary_in(parent.path().join("absent")).unwrap_err();
    assert!(matches!(error, ToonifyError::Write { .. }));
}
