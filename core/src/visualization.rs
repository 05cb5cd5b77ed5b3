use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use image::{codecs::png::PngEncoder, ColorType, ImageEncoder};

/// Prefix of the prediction images written next to the experiment outputs.
pub const OUTPUT_IMG_PREFIX: &str = "output_g";

/// Which split a prediction image shows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

/// File name of the prediction image for `image_index`, e.g. `output_g_3_test.png`.
pub fn prediction_file_name(image_index: usize, split: Split) -> String {
    format!("{}_{}_{}.png", OUTPUT_IMG_PREFIX, image_index, split.label())
}

/// Encode an RGB image (values in [0, 1]) as PNG bytes.
pub fn encode_rgb_png(width: u32, height: u32, pixels: &[f32]) -> Result<Vec<u8>> {
    let expected_len = (width * height * 3) as usize;
    if pixels.len() != expected_len {
        anyhow::bail!(
            "pixel buffer length {} does not match RGB image size {}x{}",
            pixels.len(),
            width,
            height
        );
    }

    let encoded = to_rgb8(pixels);
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new(&mut buffer);
    encoder
        .write_image(&encoded, width, height, ColorType::Rgb8)
        .context("failed to encode RGB PNG data")?;

    Ok(buffer)
}

/// Encode an RGB image (values in [0, 1]) as a PNG data URL.
pub fn encode_rgb_png_data_url(width: u32, height: u32, pixels: &[f32]) -> Result<String> {
    let buffer = encode_rgb_png(width, height, pixels)?;
    let base64 = base64::engine::general_purpose::STANDARD.encode(&buffer);
    Ok(format!("data:image/png;base64,{base64}"))
}

/// Write an RGB image (values in [0, 1]) to `path` as PNG.
pub fn save_rgb_png(path: &Path, width: u32, height: u32, pixels: &[f32]) -> Result<()> {
    let buffer = encode_rgb_png(width, height, pixels)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, buffer)
        .with_context(|| format!("failed to write image to {}", path.display()))
}

fn to_rgb8(pixels: &[f32]) -> Vec<u8> {
    pixels
        .iter()
        .map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}
