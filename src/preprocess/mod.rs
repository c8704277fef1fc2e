//! Turns an arbitrary uploaded image into the classifier's input tensor.
//!
//! The pipeline runs in a fixed order:
//!
//! 1. decode the bytes (PNG, JPEG, BMP, GIF)
//! 2. convert to one grayscale channel (alpha is composited over white first)
//! 3. resize to 28x28 with area averaging
//! 4. invert: `255 - v`
//! 5. normalize: `v / 255.0`
//! 6. add a leading batch dimension, giving shape `(1, 28, 28)`
//!
//! Every step is a public function so the server, the offline `predict`
//! command and the training data loader all share one implementation.

pub mod resize;

pub use resize::resize_area;

use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

use crate::error::PreprocessError;
use crate::math::tensor::Tensor;

/// Side length of the square model input.
pub const INPUT_SIDE: u32 = 28;

/// A `(1, 28, 28)` tensor of inverted, normalized pixel intensities.
///
/// Only produced by the functions in this module, so every element is in
/// `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
}

impl NormalizedTensor {
    pub const SHAPE: [usize; 3] = [1, INPUT_SIDE as usize, INPUT_SIDE as usize];

    pub fn shape(&self) -> [usize; 3] {
        Self::SHAPE
    }

    /// Row-major pixel values of the single batch item.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * INPUT_SIDE as usize + col]
    }

    /// The `(1, 28, 28)` tensor.
    pub fn to_tensor(&self) -> Tensor {
        Tensor::from_vec(&Self::SHAPE, self.data.clone())
    }

    /// The same values laid out as a `(1, 1, 28, 28)` channel-first batch,
    /// the layout convolutional layers consume.
    pub fn to_batch(&self) -> Tensor {
        let side = INPUT_SIDE as usize;
        Tensor::from_vec(&[1, 1, side, side], self.data.clone())
    }
}

/// Runs the full pipeline on encoded image bytes.
pub fn preprocess(bytes: &[u8]) -> Result<NormalizedTensor, PreprocessError> {
    let img = image::load_from_memory(bytes)?;
    preprocess_image(&img)
}

/// Runs steps 2-6 on an already decoded image.
pub fn preprocess_image(img: &DynamicImage) -> Result<NormalizedTensor, PreprocessError> {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(PreprocessError::Degenerate { width, height });
    }
    debug!(width, height, color = ?img.color(), "preprocessing image");

    let gray = to_grayscale(img);
    let resized = resize_area(&gray, INPUT_SIDE, INPUT_SIDE);
    let inverted = invert(&resized);
    let data = inverted.pixels().map(|p| normalize(p.0[0])).collect();
    Ok(NormalizedTensor { data })
}

/// ITU-R 601-2 luma in 16-bit fixed point:
/// `L = R * 299/1000 + G * 587/1000 + B * 114/1000`.
///
/// Transparent and translucent pixels are composited over a white
/// background first, so alpha never reads as ink.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    let rgba = img.to_rgba8();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let over_white = |c: u8| -> u32 {
            (c as u32 * a as u32 + 255 * (255 - a as u32) + 127) / 255
        };
        let luma = (over_white(r) * 19595 + over_white(g) * 38470 + over_white(b) * 7471 + 0x8000) >> 16;
        Luma([luma.min(255) as u8])
    })
}

/// `255 - v` for every pixel, turning dark strokes on a light canvas into
/// bright strokes on a dark one.
pub fn invert(img: &GrayImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([255 - img.get_pixel(x, y).0[0]])
    })
}

/// Maps an 8-bit intensity onto `[0.0, 1.0]`.
pub fn normalize(value: u8) -> f32 {
    value as f32 / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    fn assert_in_range(t: &NormalizedTensor) {
        assert_eq!(t.shape(), [1, 28, 28]);
        assert_eq!(t.as_slice().len(), 784);
        assert!(t.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn all_white_image_becomes_all_zeros() {
        let bytes = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_pixel(28, 28, Luma([255]))));
        let t = preprocess(&bytes).unwrap();
        assert_in_range(&t);
        assert!(t.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn all_black_image_becomes_all_ones() {
        let bytes = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 40, Luma([0]))));
        let t = preprocess(&bytes).unwrap();
        assert!(t.as_slice().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn color_photo_of_any_size_yields_model_shape() {
        let img = RgbImage::from_fn(200, 150, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]));
        let t = preprocess(&png_bytes(DynamicImage::ImageRgb8(img))).unwrap();
        assert_in_range(&t);
    }

    #[test]
    fn identical_bytes_give_identical_tensors() {
        let img = RgbImage::from_fn(97, 61, |x, y| Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 40]));
        let bytes = png_bytes(DynamicImage::ImageRgb8(img));
        assert_eq!(preprocess(&bytes).unwrap(), preprocess(&bytes).unwrap());
    }

    #[test]
    fn every_element_is_one_minus_scaled_pixel() {
        let gray = GrayImage::from_fn(28, 28, |x, y| Luma([((x * 9 + y) % 256) as u8]));
        let t = preprocess_image(&DynamicImage::ImageLuma8(gray.clone())).unwrap();
        for y in 0..28 {
            for x in 0..28 {
                let px = gray.get_pixel(x, y).0[0] as f32;
                let expected = 1.0 - px / 255.0;
                assert!((t.get(y as usize, x as usize) - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn transparent_background_is_treated_as_white() {
        // Black ink on a fully transparent (0,0,0,0) canvas.
        let mut img = RgbaImage::from_pixel(28, 28, Rgba([0, 0, 0, 0]));
        img.put_pixel(5, 5, Rgba([0, 0, 0, 255]));
        let t = preprocess(&png_bytes(DynamicImage::ImageRgba8(img))).unwrap();
        assert_eq!(t.get(5, 5), 1.0);
        assert_eq!(t.get(0, 0), 0.0);
    }

    #[test]
    fn luma_weights_follow_itu_601() {
        let img = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let gray = to_grayscale(&DynamicImage::ImageRgb8(img));
        assert_eq!(gray.into_raw(), vec![76, 150, 29]);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = preprocess(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
        assert!(err.to_string().contains("decode"));
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let bytes = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_pixel(28, 28, Luma([255]))));
        assert!(preprocess(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let err = preprocess_image(&DynamicImage::new_luma8(0, 10)).unwrap_err();
        assert!(matches!(err, PreprocessError::Degenerate { width: 0, height: 10 }));
    }

    #[test]
    fn batch_layout_is_channel_first() {
        let t = preprocess_image(&DynamicImage::ImageLuma8(GrayImage::from_pixel(28, 28, Luma([0])))).unwrap();
        assert_eq!(t.to_batch().shape, vec![1, 1, 28, 28]);
        assert_eq!(t.to_tensor().shape, vec![1, 28, 28]);
    }
}
