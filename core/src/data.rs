//! Image regression data.
//!
//! Each image becomes a regression problem from pixel coordinates to RGB
//! values. The test split is the full `res x res` grid, the train split keeps
//! every second pixel along both axes.

use std::{
    f32::consts::TAU,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use rand::Rng;
use tracing::{debug, info};

use crate::rng::seeded_rng;

pub const COORD_DIM: usize = 2;
pub const CHANNELS: usize = 3;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Coordinates and RGB targets of one split, both row-major.
#[derive(Clone, Debug)]
pub struct ImageSplit {
    width: usize,
    height: usize,
    coords: Vec<f32>,
    pixels: Vec<f32>,
}

impl ImageSplit {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat `[len, 2]` buffer of `(x, y)` coordinates in `[0, 1)`.
    pub fn coords(&self) -> &[f32] {
        &self.coords
    }

    /// Flat `[len, 3]` buffer of RGB values in `[0, 1]`.
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn coord(&self, idx: usize) -> &[f32] {
        &self.coords[idx * COORD_DIM..(idx + 1) * COORD_DIM]
    }

    pub fn pixel(&self, idx: usize) -> &[f32] {
        &self.pixels[idx * CHANNELS..(idx + 1) * CHANNELS]
    }
}

#[derive(Clone, Debug)]
pub struct RegressionImage {
    pub name: String,
    pub train: ImageSplit,
    pub test: ImageSplit,
}

impl RegressionImage {
    /// Build both splits from a square RGB image stored row-major as `[res, res, 3]`.
    pub fn from_pixels(name: impl Into<String>, resolution: usize, pixels: Vec<f32>) -> Result<Self> {
        check_resolution(resolution)?;
        if pixels.len() != resolution * resolution * CHANNELS {
            bail!(
                "pixel buffer length {} does not match image size {}x{}",
                pixels.len(),
                resolution,
                resolution
            );
        }

        let step = 1.0 / resolution as f32;
        let mut coords = Vec::with_capacity(resolution * resolution * COORD_DIM);
        for row in 0..resolution {
            for col in 0..resolution {
                coords.push(col as f32 * step);
                coords.push(row as f32 * step);
            }
        }

        let half = resolution / 2;
        let mut train_coords = Vec::with_capacity(half * half * COORD_DIM);
        let mut train_pixels = Vec::with_capacity(half * half * CHANNELS);
        for row in (0..resolution).step_by(2) {
            for col in (0..resolution).step_by(2) {
                let idx = row * resolution + col;
                train_coords.extend_from_slice(&coords[idx * COORD_DIM..(idx + 1) * COORD_DIM]);
                train_pixels.extend_from_slice(&pixels[idx * CHANNELS..(idx + 1) * CHANNELS]);
            }
        }

        Ok(Self {
            name: name.into(),
            train: ImageSplit {
                width: half,
                height: half,
                coords: train_coords,
                pixels: train_pixels,
            },
            test: ImageSplit {
                width: resolution,
                height: resolution,
                coords,
                pixels,
            },
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct ImageRegressionDataset {
    images: Vec<RegressionImage>,
}

impl ImageRegressionDataset {
    /// Load every image in `dir` (sorted by file name), center-cropped and resized to `resolution`.
    pub fn load_dir(dir: &Path, resolution: usize) -> Result<Self> {
        check_resolution(resolution)?;

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("failed to read image directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_image_file(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            bail!("no images found in {}", dir.display());
        }

        let mut images = Vec::with_capacity(paths.len());
        for path in &paths {
            let decoded = image::open(path)
                .with_context(|| format!("failed to decode image {}", path.display()))?;
            let pixels = square_rgb(&decoded, resolution);
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            debug!(image = %name, resolution, "loaded image");
            images.push(RegressionImage::from_pixels(name, resolution, pixels)?);
        }

        info!(count = images.len(), resolution, dir = %dir.display(), "loaded image regression dataset");
        Ok(Self { images })
    }

    /// Procedural images built from a handful of random sinusoids per channel.
    pub fn synthetic(count: usize, resolution: usize, seed: u64) -> Result<Self> {
        check_resolution(resolution)?;
        let mut rng = seeded_rng(seed);
        let mut images = Vec::with_capacity(count);

        for index in 0..count {
            let waves: Vec<[f32; 4]> = (0..CHANNELS * 3)
                .map(|_| {
                    [
                        rng.gen_range(-6.0..6.0),
                        rng.gen_range(-6.0..6.0),
                        rng.gen_range(0.0..TAU),
                        rng.gen_range(0.2..1.0),
                    ]
                })
                .collect();

            let mut pixels = Vec::with_capacity(resolution * resolution * CHANNELS);
            for row in 0..resolution {
                let y = row as f32 / resolution as f32;
                for col in 0..resolution {
                    let x = col as f32 / resolution as f32;
                    for channel in waves.chunks(3) {
                        let total: f32 = channel.iter().map(|w| w[3]).sum();
                        let value: f32 = channel
                            .iter()
                            .map(|&[fx, fy, phase, amp]| amp * (TAU * (fx * x + fy * y) + phase).sin())
                            .sum();
                        pixels.push(0.5 + 0.5 * value / total);
                    }
                }
            }

            images.push(RegressionImage::from_pixels(
                format!("synthetic_{index}"),
                resolution,
                pixels,
            )?);
        }

        Ok(Self { images })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Fail unless the dataset holds at least `count` images.
    pub fn require_images(&self, count: usize) -> Result<()> {
        if count > self.len() {
            bail!(
                "requested {} images but the dataset only has {}",
                count,
                self.len()
            );
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&RegressionImage> {
        self.images
            .get(index)
            .ok_or_else(|| anyhow!("image index {} out of bounds (dataset has {})", index, self.len()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegressionImage> {
        self.images.iter()
    }
}

fn check_resolution(resolution: usize) -> Result<()> {
    if resolution == 0 || resolution % 2 != 0 {
        bail!("resolution must be even and > 0, got {}", resolution);
    }
    Ok(())
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn square_rgb(image: &DynamicImage, resolution: usize) -> Vec<f32> {
    let side = image.width().min(image.height());
    let x = (image.width() - side) / 2;
    let y = (image.height() - side) / 2;
    let side_px = resolution as u32;

    image
        .crop_imm(x, y, side, side)
        .resize_exact(side_px, side_px, FilterType::Triangle)
        .to_rgb8()
        .into_raw()
        .into_iter()
        .map(|value| f32::from(value) / 255.0)
        .collect()
}
