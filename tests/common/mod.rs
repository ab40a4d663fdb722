//! Fixtures shared by the integration tests.
//!
//! Everything is generated into temporary directories, so the tests need no
//! checked-in media files.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage};
use toonify::ToonifyError;

/// A deterministic picture with smooth gradients and a hard-edged square.
pub fn sample_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let inside = x > width / 4 && x < 3 * width / 4 && y > height / 4 && y < 3 * height / 4;
        if inside {
            Rgb([230, 40, 40])
        } else {
            Rgb([
                ((x * 200) / width.max(1)) as u8 + 20,
                ((y * 200) / height.max(1)) as u8 + 20,
                120,
            ])
        }
    });
    DynamicImage::ImageRgb8(image)
}

/// Save [`sample_image`] as a PNG inside `directory` and return its path.
pub fn write_sample_png(directory: &Path, width: u32, height: u32) -> PathBuf {
    let path = directory.join("source.png");
    sample_image(width, height).save(&path).expect("save sample image");
    path
}

/// Write a 16-bit PCM WAV file containing a 440 Hz tone.
pub fn write_wav(path: &Path, seconds: f64, sample_rate: u32, channels: u16) {
    let frames = (seconds * sample_rate as f64).round() as u32;
    let block_align = channels as u32 * 2;
    let data_len = frames * block_align;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    for frame in 0..frames {
        let phase = frame as f64 * 440.0 * std::f64::consts::TAU / sample_rate as f64;
        let sample = (phase.sin() * 8000.0) as i16;
        for _ in 0..channels {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }

    fs::write(path, bytes).expect("write wav");
}

/// Whether `error` means the local FFmpeg build lacks a required encoder,
/// in which case the calling test skips.
pub fn encoder_unavailable(error: &ToonifyError) -> bool {
    let message = error.to_string();
    let missing = message.contains("cannot open encoder")
        || message.contains("cannot open video encoder")
        || message.contains("cannot open audio encoder")
        || message.contains("not available");
    if missing {
        eprintln!("Skipping: encoder not available ({message})");
    }
    missing
}

/// Names of the entries directly inside `directory`, sorted.
pub fn entries(directory: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(directory)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
