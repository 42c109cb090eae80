//! Image loading and conversion helpers built on the `image` crate

use crate::Result;
use crate::error::CascadeError;
use anyhow::Context;
use image::{GrayImage, Rgb, RgbImage, RgbaImage, imageops};
use std::path::Path;

/// Largest accepted side of a capture
pub const MAX_IMAGE_SIDE: u32 = 16_384;

/// Image utility functions
pub struct ImageUtils;

impl ImageUtils {
    /// Load image as RGB, compositing any transparency onto white
    pub fn load_rgb<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
        let img = image::open(&path)
            .with_context(|| format!("Failed to open image: {:?}", path.as_ref()))?
            .to_rgba8();

        Ok(Self::flatten_on_white(&img))
    }

    /// Alpha-composite an RGBA sprite onto a white background
    pub fn flatten_on_white(rgba_image: &RgbaImage) -> RgbImage {
        let (width, height) = rgba_image.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            let [r, g, b, a] = rgba_image.get_pixel(x, y).0;
            let alpha = a as u32;
            let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
            Rgb([blend(r), blend(g), blend(b)])
        })
    }

    pub fn to_gray(rgb_image: &RgbImage) -> GrayImage {
        imageops::grayscale(rgb_image)
    }

    /// Copy the `(x, y, width, height)` rectangle out of `image`
    pub fn crop(image: &RgbImage, rect: (u32, u32, u32, u32)) -> RgbImage {
        let (x, y, width, height) = rect;
        imageops::crop_imm(image, x, y, width, height).to_image()
    }

    /// Basic shape check every capture must pass before detection
    pub fn validate_dimensions(width: u32, height: u32) -> std::result::Result<(), CascadeError> {
        if width == 0 || height == 0 {
            return Err(CascadeError::MalformedInput(format!(
                "image has no pixels ({}x{})",
                width, height
            )));
        }
        if width > MAX_IMAGE_SIDE || height > MAX_IMAGE_SIDE {
            return Err(CascadeError::MalformedInput(format!(
                "image {}x{} exceeds the {} pixel side limit",
                width, height, MAX_IMAGE_SIDE
            )));
        }
        Ok(())
    }
}
