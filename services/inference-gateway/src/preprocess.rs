//! Decoding and normalisation of uploaded images into the encoder's input.

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, RgbImage};
use ndarray::Array3;
use thiserror::Error;

/// Height and width of every tensor the models see.
pub const IMAGE_SIZE: usize = 64;
pub const PIXELS: usize = IMAGE_SIZE * IMAGE_SIZE;

/// Normalisation used at training time: `(x - MEAN) / STD` on `[0, 1]` pixels.
pub const NORM_MEAN: f32 = 0.5;
pub const NORM_STD: f32 = 0.5;

/// Single-channel image laid out as `(channel, height, width)`.
pub type ImageTensor = Array3<f32>;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("empty image payload")]
    Empty,
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero width or height")]
    ZeroSized,
}

pub fn preprocess(bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
    if bytes.is_empty() { return Err(PreprocessError::Empty); }
    let img = image::load_from_memory(bytes)?;
    preprocess_image(&img)
}

/// Grayscale, resize to 64x64, scale to `[0, 1]`, normalise.
pub fn preprocess_image(img: &DynamicImage) -> Result<ImageTensor, PreprocessError> {
    if img.width() == 0 || img.height() == 0 { return Err(PreprocessError::ZeroSized); }
    let gray = luminance(&img.to_rgb8());
    let side = IMAGE_SIZE as u32;
    let resized = image::imageops::resize(&gray, side, side, FilterType::Triangle);
    Ok(Array3::from_shape_fn((1, IMAGE_SIZE, IMAGE_SIZE), |(_, y, x)| {
        normalize_pixel(resized.get_pixel(x as u32, y as u32).0[0])
    }))
}

/// ITU-R 601-2 luma in 16.16 fixed point, so results match the usual
/// `L = R*299/1000 + G*587/1000 + B*114/1000` conversion bit for bit.
fn luminance(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let l = (u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

pub fn normalize_pixel(p: u8) -> f32 { (f32::from(p) / 255.0 - NORM_MEAN) / NORM_STD }
