//! Cartoon stylization of a single still image.
//!
//! [`Stylizer`] turns a decoded [`DynamicImage`] into a flat-shaded,
//! outlined frame in three steps:
//!
//! 1. an edge-preserving bilateral filter (diameter 9, sigma 300) flattens
//!    regions while keeping their boundaries sharp;
//! 2. a mean-based adaptive threshold (9 × 9 block, offset 2) over the
//!    smoothed luminance marks every pixel darker than its neighbourhood as
//!    an edge;
//! 3. edge pixels are zeroed in the smoothed image, drawing dark outlines.
//!
//! The transform is deterministic: identical input bytes always produce
//! identical output bytes.
//!
//! # Example
//!
//! ```no_run
//! use toonify::{ColorMode, StylizeOptions, Stylizer, ToonifyError};
//!
//! let source = toonify::load_source_image("photo.jpg")?;
//! let frame = Stylizer::new(StylizeOptions::new().color_mode(ColorMode::Color))
//!     .stylize(&source);
//! frame.save("cartoon.png")?;
//! # Ok::<(), ToonifyError>(())
//! ```

use std::path::Path;

use image::{
    DynamicImage, GrayImage, ImageBuffer, ImageDecoder, ImageReader, Luma, Rgb, RgbImage,
    metadata::Orientation,
};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::configuration::ColorMode;
use crate::error::ToonifyError;

/// Open and decode the source image at `path`.
///
/// The format is guessed from the file contents, not the extension. An
/// EXIF orientation tag is applied, so photos come out upright.
///
/// # Errors
///
/// [`ToonifyError::Decode`] naming `path` if the file cannot be opened or
/// is not a decodable raster image.
pub fn load_source_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage, ToonifyError> {
    let path = path.as_ref();
    let decode_error = |reason: String| ToonifyError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let mut decoder = ImageReader::open(path)
        .map_err(|error| decode_error(error.to_string()))?
        .with_guessed_format()
        .map_err(|error| decode_error(error.to_string()))?
        .into_decoder()
        .map_err(|error| decode_error(error.to_string()))?;
    let orientation = decoder.orientation().unwrap_or_else(|error| {
        log::debug!("Ignoring unreadable orientation of {:?}: {error}", path);
        Orientation::NoTransforms
    });
    let mut image =
        DynamicImage::from_decoder(decoder).map_err(|error| decode_error(error.to_string()))?;
    if orientation != Orientation::NoTransforms {
        log::debug!("Applying {:?} to {:?}", orientation, path);
        image.apply_orientation(orientation);
    }

    log::debug!(
        "Decoded {:?} ({}x{}, {:?})",
        path,
        image.width(),
        image.height(),
        image.color(),
    );
    Ok(image)
}

/// Stylizer settings.
///
/// Only the color mode is selectable; the filter constants are fixed and
/// exposed as associated constants for reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StylizeOptions {
    /// Whether to stylize the luminance channel or the color buffer.
    pub color_mode: ColorMode,
}

impl StylizeOptions {
    /// Neighbourhood diameter of the bilateral filter.
    pub const BILATERAL_DIAMETER: u32 = 9;
    /// Range (intensity) sigma of the bilateral filter.
    pub const SIGMA_COLOR: f32 = 300.0;
    /// Spatial sigma of the bilateral filter.
    pub const SIGMA_SPACE: f32 = 300.0;
    /// Side of the square neighbourhood used for the adaptive threshold.
    pub const THRESHOLD_BLOCK_SIZE: u32 = 9;
    /// Constant subtracted from the local mean before thresholding.
    pub const THRESHOLD_OFFSET: f64 = 2.0;

    /// Default options (grayscale).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the color mode.
    pub fn color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }
}

/// Applies the cartoon transform.
///
/// Create via [`Stylizer::new`], then call [`stylize`](Stylizer::stylize).
#[derive(Debug, Clone, Default)]
pub struct Stylizer {
    options: StylizeOptions,
}

impl Stylizer {
    /// Create a stylizer with the given options.
    pub fn new(options: StylizeOptions) -> Self {
        Self { options }
    }

    /// Stylize `image`.
    ///
    /// Returns [`DynamicImage::ImageLuma8`] in grayscale mode and
    /// [`DynamicImage::ImageRgb8`] in color mode, with the same dimensions
    /// as the input. Any alpha channel is discarded.
    pub fn stylize(&self, image: &DynamicImage) -> DynamicImage {
        let rgb = image.to_rgb8();
        log::debug!(
            "Stylizing {}x{} image (mode={:?})",
            rgb.width(),
            rgb.height(),
            self.options.color_mode,
        );

        match self.options.color_mode {
            ColorMode::Grayscale => {
                let smoothed = bilateral_filter_gray(&luminance(&rgb));
                let edges = edge_mask(&smoothed);
                let mut output = smoothed;
                for (pixel, edge) in output.pixels_mut().zip(edges.pixels()) {
                    if edge.0[0] == 0 {
                        pixel.0[0] = 0;
                    }
                }
                DynamicImage::ImageLuma8(output)
            }
            ColorMode::Color => {
                let smoothed = bilateral_filter_rgb(&rgb);
                let edges = edge_mask(&luminance(&smoothed));
                let mut output = smoothed;
                for (pixel, edge) in output.pixels_mut().zip(edges.pixels()) {
                    if edge.0[0] == 0 {
                        pixel.0 = [0, 0, 0];
                    }
                }
                DynamicImage::ImageRgb8(output)
            }
        }
    }
}

/// BT.601 luminance in 14-bit fixed point, matching the usual
/// `RGB → GRAY` conversion of computer-vision libraries.
pub fn luminance(rgb: &RgbImage) -> GrayImage {
    const R_WEIGHT: u32 = 4899;
    const G_WEIGHT: u32 = 9617;
    const B_WEIGHT: u32 = 1868;
    const SHIFT: u32 = 14;

    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (out, pixel) in gray.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = pixel.0;
        let y = (r as u32 * R_WEIGHT + g as u32 * G_WEIGHT + b as u32 * B_WEIGHT
            + (1 << (SHIFT - 1)))
            >> SHIFT;
        *out = Luma([y as u8]);
    }
    gray
}

/// Binary edge mask by mean adaptive thresholding.
///
/// A pixel is background (255) when it is brighter than its 9 × 9 local
/// mean minus the offset, and edge (0) otherwise. Borders replicate the
/// outermost row/column.
pub fn edge_mask(gray: &GrayImage) -> GrayImage {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let mut mask = GrayImage::new(gray.width(), gray.height());
    if width == 0 || height == 0 {
        return mask;
    }

    let radius = (StylizeOptions::THRESHOLD_BLOCK_SIZE / 2) as isize;
    let area = (StylizeOptions::THRESHOLD_BLOCK_SIZE * StylizeOptions::THRESHOLD_BLOCK_SIZE) as f64;
    let delta = StylizeOptions::THRESHOLD_OFFSET.ceil() as i32;

    // Summed-area table over the replicate-padded image.
    let padded_width = width + 2 * radius as usize;
    let padded_height = height + 2 * radius as usize;
    let src = gray.as_raw();
    let mut integral = vec![0u64; (padded_width + 1) * (padded_height + 1)];
    for py in 0..padded_height {
        let sy = replicate(py as isize - radius, height);
        let mut row_sum = 0u64;
        for px in 0..padded_width {
            let sx = replicate(px as isize - radius, width);
            row_sum += src[sy * width + sx] as u64;
            integral[(py + 1) * (padded_width + 1) + px + 1] =
                integral[py * (padded_width + 1) + px + 1] + row_sum;
        }
    }

    let block = StylizeOptions::THRESHOLD_BLOCK_SIZE as usize;
    let stride = padded_width + 1;
    let out: &mut [u8] = &mut mask;
    for y in 0..height {
        for x in 0..width {
            let sum = integral[(y + block) * stride + x + block] + integral[y * stride + x]
                - integral[y * stride + x + block]
                - integral[(y + block) * stride + x];
            let mean = (sum as f64 / area).round() as i32;
            let value = src[y * width + x] as i32;
            out[y * width + x] = if value - mean > -delta { 255 } else { 0 };
        }
    }
    mask
}

/// Edge-preserving bilateral smoothing of a grayscale image.
pub fn bilateral_filter_gray(gray: &GrayImage) -> GrayImage {
    let data = bilateral_filter(gray.as_raw(), gray.width(), gray.height(), 1);
    ImageBuffer::<Luma<u8>, _>::from_raw(gray.width(), gray.height(), data)
        .unwrap_or_else(|| GrayImage::new(gray.width(), gray.height()))
}

/// Edge-preserving bilateral smoothing of an RGB image.
///
/// The range distance between two pixels is the sum of their per-channel
/// absolute differences.
pub fn bilateral_filter_rgb(rgb: &RgbImage) -> RgbImage {
    let data = bilateral_filter(rgb.as_raw(), rgb.width(), rgb.height(), 3);
    ImageBuffer::<Rgb<u8>, _>::from_raw(rgb.width(), rgb.height(), data)
        .unwrap_or_else(|| RgbImage::new(rgb.width(), rgb.height()))
}

/// Precomputed spatial and range kernels.
struct BilateralKernel {
    /// `(dx, dy, weight)` for every offset inside the circular window.
    spatial: Vec<(isize, isize, f32)>,
    /// Range weight indexed by the (summed) absolute intensity difference.
    range: Vec<f32>,
}

impl BilateralKernel {
    fn new(channels: usize) -> Self {
        let radius = (StylizeOptions::BILATERAL_DIAMETER / 2) as isize;
        let space_coeff = -0.5 / (StylizeOptions::SIGMA_SPACE * StylizeOptions::SIGMA_SPACE);
        let color_coeff = -0.5 / (StylizeOptions::SIGMA_COLOR * StylizeOptions::SIGMA_COLOR);

        let mut spatial = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let dist_sq = (dx * dx + dy * dy) as f32;
                if dist_sq > (radius * radius) as f32 {
                    continue;
                }
                spatial.push((dx, dy, (dist_sq * space_coeff).exp()));
            }
        }

        let range = (0..256 * channels)
            .map(|diff| {
                let diff = diff as f32;
                (diff * diff * color_coeff).exp()
            })
            .collect();

        Self { spatial, range }
    }
}

fn bilateral_filter(src: &[u8], width: u32, height: u32, channels: usize) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let mut output = vec![0u8; width * height * channels];
    if width == 0 || height == 0 {
        return output;
    }

    let radius = (StylizeOptions::BILATERAL_DIAMETER / 2) as usize;
    let kernel = BilateralKernel::new(channels);

    // Reflect-101 padding so the inner loop never bounds-checks offsets.
    let padded_width = width + 2 * radius;
    let padded_height = height + 2 * radius;
    let mut padded = vec![0u8; padded_width * padded_height * channels];
    for py in 0..padded_height {
        let sy = reflect_101(py as isize - radius as isize, height);
        for px in 0..padded_width {
            let sx = reflect_101(px as isize - radius as isize, width);
            let src_at = (sy * width + sx) * channels;
            let dst_at = (py * padded_width + px) * channels;
            padded[dst_at..dst_at + channels].copy_from_slice(&src[src_at..src_at + channels]);
        }
    }

    let filter_row = |y: usize, row: &mut [u8]| {
        let mut sums = [0f32; 3];
        for x in 0..width {
            let centre_at = ((y + radius) * padded_width + x + radius) * channels;
            let centre = &padded[centre_at..centre_at + channels];
            sums[..channels].fill(0.0);
            let mut weight_sum = 0f32;

            for &(dx, dy, spatial_weight) in &kernel.spatial {
                let py = (y + radius) as isize + dy;
                let px = (x + radius) as isize + dx;
                let at = (py as usize * padded_width + px as usize) * channels;
                let neighbour = &padded[at..at + channels];

                let diff: usize = neighbour
                    .iter()
                    .zip(centre)
                    .map(|(&n, &c)| (n as i32 - c as i32).unsigned_abs() as usize)
                    .sum();
                let weight = spatial_weight * kernel.range[diff];
                for (sum, &value) in sums.iter_mut().zip(neighbour) {
                    *sum += value as f32 * weight;
                }
                weight_sum += weight;
            }

            for (channel, sum) in sums[..channels].iter().enumerate() {
                row[x * channels + channel] = (sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
        }
    };

    let row_len = width * channels;

    #[cfg(feature = "rayon")]
    output
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| filter_row(y, row));

    #[cfg(not(feature = "rayon"))]
    output
        .chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| filter_row(y, row));

    output
}

/// Mirror an out-of-range index without repeating the edge sample
/// (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let mut index = index;
    while index < 0 || index >= len {
        if index < 0 {
            index = -index;
        }
        if index >= len {
            index = 2 * len - 2 - index;
        }
    }
    index as usize
}

/// Clamp an out-of-range index to the nearest edge sample.
fn replicate(index: isize, len: usize) -> usize {
    index.clamp(0, len as isize - 1) as usize
}
