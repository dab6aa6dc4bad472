use std::path::Path;

use image::{ImageFormat, RgbImage};
use thiserror::Error;

use crate::geometry::{Fp, Vec3f};
use crate::npy::{NpyArray, NpyError};

/// Luminance at which the tone curve halves the input.
pub const TONE_MAP_LIMIT: Fp = 1.5;
const INV_GAMMA: Fp = 1.0 / 2.2;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error(transparent)]
    Npy(#[from] NpyError),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("expected an array of shape (rows, cols, 3), got {0:?}")]
    Shape(Vec<usize>),
}

pub fn tone_map(c: Vec3f) -> Vec3f {
    let luminance = 0.3 * c.x + 0.6 * c.y + 0.1 * c.z;
    c / (1.0 + luminance / TONE_MAP_LIMIT)
}

pub fn linear_to_srgb(c: Vec3f) -> Vec3f {
    c.map(|x| x.powf(INV_GAMMA).clamp(0.0, 1.0))
}

/// Displays axis 0 as rows, the way array viewers show the file.
pub fn reference_to_image(array: &NpyArray) -> Result<RgbImage, PreviewError> {
    let [rows, cols, 3] = array.shape[..] else {
        return Err(PreviewError::Shape(array.shape.clone()));
    };
    let mut img = RgbImage::new(cols as u32, rows as u32);
    for (index, rgb) in array.data.chunks_exact(3).enumerate() {
        let c = linear_to_srgb(tone_map(Vec3f::new(rgb[0], rgb[1], rgb[2])));
        let pixel = img.get_pixel_mut((index % cols) as u32, (index / cols) as u32);
        for i in 0..3 {
            pixel.0[i] = (c[i] * 255.0).round() as u8;
        }
    }
    Ok(img)
}

pub fn write_preview(npy_path: &Path, png_path: &Path) -> Result<(), PreviewError> {
    let array = NpyArray::load(npy_path)?;
    reference_to_image(&array)?.save_with_format(png_path, ImageFormat::Png)?;
    log::info!("[preview] {} -> {}", npy_path.display(), png_path.display());
    Ok(())
}
