//! Frame store and materializer integration tests.

mod common;

use std::sync::{Arc, Mutex};

use image::DynamicImage;
use toonify::{
    CancellationToken, DirectoryFrameStore, FrameMaterializer, FrameSequence, FrameStore,
    MemoryFrameStore, OperationType, PipelineOptions, ProgressCallback, ProgressInfo,
    StylizeOptions, Stylizer, ToonifyError,
};

fn stylized_frame() -> DynamicImage {
    Stylizer::new(StylizeOptions::default()).stylize(&common::sample_image(32, 24))
}

#[test]
fn directory_store_holds_exactly_count_frames() {
    let directory = tempfile::tempdir().unwrap();
    let frame = stylized_frame();
    let mut store = DirectoryFrameStore::new(directory.path(), 12);

    let sequence = FrameMaterializer::new()
        .materialize(&frame, 12, &mut store)
        .unwrap();
    assert_eq!(sequence.len(), 12);

    let names = common::entries(directory.path());
    assert_eq!(names.len(), 12);
    assert_eq!(names.first().map(String::as_str), Some("frame_000.png"));
    assert_eq!(names.last().map(String::as_str), Some("frame_011.png"));
}

#[test]
fn every_artifact_decodes_to_the_stylized_frame() {
    let directory = tempfile::tempdir().unwrap();
    let frame = stylized_frame();
    let mut store = DirectoryFrameStore::new(directory.path(), 5);

    let sequence = FrameMaterializer::new()
        .materialize(&frame, 5, &mut store)
        .unwrap();
    for decoded in sequence.frames() {
        assert_eq!(decoded.unwrap(), frame);
    }
}

#[test]
fn memory_store_matches_directory_store() {
    let directory = tempfile::tempdir().unwrap();
    let frame = stylized_frame();
    let materializer = FrameMaterializer::new();

    let mut on_disk = DirectoryFrameStore::new(directory.path(), 4);
    let mut in_memory = MemoryFrameStore::new();
    let disk_sequence = materializer.materialize(&frame, 4, &mut on_disk).unwrap();
    let disk_bytes: Vec<Vec<u8>> = (0..4).map(|i| disk_sequence.frame_bytes(i).unwrap()).collect();
    let memory_sequence = materializer.materialize(&frame, 4, &mut in_memory).unwrap();
    let memory_bytes: Vec<Vec<u8>> =
        (0..4).map(|i| memory_sequence.frame_bytes(i).unwrap()).collect();

    assert_eq!(disk_bytes, memory_bytes);
    assert!(common::entries(directory.path()).len() == 4);
}

#[test]
fn iterate_yields_indices_in_order() {
    let frame = stylized_frame();
    let mut store = MemoryFrameStore::new();
    FrameMaterializer::new()
        .materialize(&frame, 7, &mut store)
        .unwrap();

    let indices: Vec<u64> = store
        .iterate()
        .unwrap()
        .map(|entry| entry.unwrap().0)
        .collect();
    assert_eq!(indices, (0..7).collect::<Vec<_>>());
}

#[test]
fn names_widen_past_a_thousand_frames() {
    assert_eq!(toonify::frame_file_name(0, 1000), "frame_000.png");
    assert_eq!(toonify::frame_file_name(999, 1000), "frame_999.png");
    assert_eq!(toonify::frame_file_name(0, 1001), "frame_0000.png");
    assert_eq!(toonify::frame_file_name(1000, 1001), "frame_1000.png");
    // An index past the declared count still gets a name that fits it.
    assert_eq!(toonify::frame_file_name(12345, 10), "frame_12345.png");
}

#[test]
fn large_sequence_has_no_collisions() {
    let directory = tempfile::tempdir().unwrap();
    let mut store = DirectoryFrameStore::new(directory.path(), 1200);
    for index in 0..1200 {
        store.put(index, &[1, 2, 3]).unwrap();
    }
    assert_eq!(store.indices().unwrap(), (0..1200).collect::<Vec<_>>());
    assert!(store.path_for(1199).ends_with("frame_1199.png"));
}

#[test]
fn zero_count_yields_empty_sequence() {
    let directory = tempfile::tempdir().unwrap();
    let mut store = DirectoryFrameStore::new(directory.path(), 0);
    let sequence = FrameMaterializer::new()
        .materialize(&stylized_frame(), 0, &mut store)
        .unwrap();
    assert!(sequence.is_empty());
    assert!(common::entries(directory.path()).is_empty());
}

#[test]
fn gap_is_reported_as_integrity_violation() {
    let mut store = MemoryFrameStore::new();
    FrameMaterializer::new()
        .materialize(&stylized_frame(), 6, &mut store)
        .unwrap();
    store.remove(3);

    let error = FrameSequence::from_store(&store).err().unwrap();
    match error {
        ToonifyError::SequenceIntegrity { expected, .. } => assert_eq!(expected, 3),
        other => panic!("expected SequenceIntegrity, got {other:?}"),
    }
}

#[test]
fn stale_artifacts_are_detected() {
    let directory = tempfile::tempdir().unwrap();
    let mut store = DirectoryFrameStore::new(directory.path(), 3);
    store.put(9, b"left over from another run").unwrap();

    let error = FrameMaterializer::new()
        .materialize(&stylized_frame(), 3, &mut store)
        .err()
        .unwrap();
    assert!(matches!(error, ToonifyError::SequenceIntegrity { .. }));
}

#[test]
fn unrelated_files_are_ignored() {
    let directory = tempfile::tempdir().unwrap();
    std::fs::write(directory.path().join("notes.txt"), b"hello").unwrap();
    std::fs::write(directory.path().join("frame_abc.png"), b"junk").unwrap();

    let mut store = DirectoryFrameStore::new(directory.path(), 2);
    let sequence = FrameMaterializer::new()
        .materialize(&stylized_frame(), 2, &mut store)
        .unwrap();
    assert_eq!(sequence.len(), 2);
}

#[test]
fn missing_frame_lookup_fails() {
    let store = MemoryFrameStore::new();
    assert!(matches!(store.get(0), Err(ToonifyError::MissingFrame(0))));

    let directory = tempfile::tempdir().unwrap();
    let store = DirectoryFrameStore::new(directory.path(), 1);
    assert!(matches!(store.get(0), Err(ToonifyError::MissingFrame(0))));
}

#[test]
fn unwritable_root_is_a_write_error() {
    let directory = tempfile::tempdir().unwrap();
    let mut store = DirectoryFrameStore::new(directory.path().join("missing"), 2);
    let error = FrameMaterializer::new()
        .materialize(&stylized_frame(), 2, &mut store)
        .err()
        .unwrap();
    assert!(matches!(error, ToonifyError::Write { .. }));
}

#[test]
fn cancelled_materialization_stops() {
    let token = CancellationToken::new();
    token.cancel();
    let options = PipelineOptions::new().with_cancellation(token);

    let mut store = MemoryFrameStore::new();
    let error = FrameMaterializer::with_options(options)
        .materialize(&stylized_frame(), 10, &mut store)
        .err()
        .unwrap();
    assert!(matches!(error, ToonifyError::Cancelled));
    assert!(store.is_empty().unwrap());
}

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<(OperationType, u64, Option<u64>)>>,
}

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.updates
            .lock()
            .unwrap()
            .push((info.operation, info.current, info.total));
    }
}

#[test]
fn materialization_reports_progress() {
    let recorder = Arc::new(Recorder::default());
    let options = PipelineOptions::new().with_progress(recorder.clone());

    let mut store = MemoryFrameStore::new();
    FrameMaterializer::with_options(options)
        .materialize(&stylized_frame(), 8, &mut store)
        .unwrap();

    let updates = recorder.updates.lock().unwrap();
    assert!(!updates.is_empty());
    assert!(updates.iter().all(|(op, _, total)| {
        *op == OperationType::Materializing && *total == Some(8)
    }));
    assert_eq!(updates.last().map(|update| update.1), Some(8));
}
