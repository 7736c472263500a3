//! Tensor -> grayscale PNG -> base64, for the images returned by `/predict`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GrayImage, ImageFormat, Luma};
use ndarray::ArrayViewD;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot render tensor of shape {0:?} as a single-channel image")]
    Shape(Vec<usize>),
    #[error("png encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Maps a normalised tensor back to 8-bit pixels: `x * 0.5 + 0.5`, clamped to
/// `[0, 1]`, scaled by 255 and truncated. The last two axes are `(H, W)`;
/// any leading axes must have length 1.
pub fn to_gray_image(tensor: ArrayViewD<'_, f32>) -> Result<GrayImage, RenderError> {
    let shape = tensor.shape().to_vec();
    if shape.len() < 2 || shape[..shape.len() - 2].iter().any(|d| *d != 1) {
        return Err(RenderError::Shape(shape));
    }
    let (h, w) = (shape[shape.len() - 2], shape[shape.len() - 1]);
    let plane = tensor.into_shape((h, w)).map_err(|_| RenderError::Shape(shape.clone()))?;
    let (Ok(width), Ok(height)) = (u32::try_from(w), u32::try_from(h)) else {
        return Err(RenderError::Shape(shape));
    };
    Ok(GrayImage::from_fn(width, height, |x, y| {
        let v = (plane[[y as usize, x as usize]] * 0.5 + 0.5).clamp(0.0, 1.0);
        Luma([(v * 255.0) as u8])
    }))
}

/// 8-bit grayscale PNG bytes of `tensor`.
pub fn encode_png(tensor: ArrayViewD<'_, f32>) -> Result<Vec<u8>, RenderError> {
    let img = to_gray_image(tensor)?;
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

pub fn encode_png_base64(tensor: ArrayViewD<'_, f32>) -> Result<String, RenderError> {
    Ok(STANDARD.encode(encode_png(tensor)?))
}
