//! Region preprocessing for the primary detector
//!
//! Brings a captured image into the input convention an artifact declares:
//! resize (letterboxed or stretched), pad, and per-channel normalization.

use crate::error::CascadeError;
use crate::mapping::LetterboxTransform;
use crate::utils::ImageUtils;
use image::{RgbImage, imageops};
use serde::{Deserialize, Serialize};

/// How the source is fitted into the model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Keep aspect ratio and pad the remainder
    Letterbox,
    /// Scale each axis independently
    Stretch,
}

/// Input resolution and normalization declared by a detector artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub resize: ResizeMode,
    pub pad_color: [u8; 3],
    /// Per-channel mean subtracted after scaling pixels to `[0, 1]`
    pub mean: [f32; 3],
    /// Per-channel divisor applied after mean subtraction
    pub std: [f32; 3],
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            resize: ResizeMode::Letterbox,
            pad_color: [114, 114, 114],
            mean: [0.0, 0.0, 0.0],
            std: [1.0, 1.0, 1.0],
        }
    }
}

impl InputSpec {
    /// Classifier-style input: 224x224 stretched, ImageNet statistics
    pub fn imagenet(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            resize: ResizeMode::Stretch,
            pad_color: [0, 0, 0],
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "model input must be non-empty, got {}x{}",
                self.width, self.height
            ));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(format!("normalization std must be finite and non-zero, got {:?}", self.std));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(format!("normalization mean must be finite, got {:?}", self.mean));
        }
        Ok(())
    }
}

/// Preprocessed model input
#[derive(Debug, Clone)]
pub struct ModelInput {
    /// Resized and padded RGB image
    pub image: RgbImage,
    /// Normalized CHW tensor, `3 * height * width` values
    pub tensor: Vec<f32>,
    /// Transform from source pixels to model pixels
    pub transform: LetterboxTransform,
}

/// Normalizes raw captures into a detector's input space
#[derive(Debug, Clone)]
pub struct RegionPreprocessor {
    spec: InputSpec,
}

impl RegionPreprocessor {
    pub fn new(spec: InputSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &InputSpec {
        &self.spec
    }

    /// Transform that [`RegionPreprocessor::prepare`] applies to a
    /// `width` x `height` source
    pub fn transform_for(&self, width: u32, height: u32) -> LetterboxTransform {
        let (resized_w, resized_h) = self.resized_size(width, height);
        let (pad_x, pad_y) = match self.spec.resize {
            ResizeMode::Letterbox => (
                self.spec.width.saturating_sub(resized_w) / 2,
                self.spec.height.saturating_sub(resized_h) / 2,
            ),
            ResizeMode::Stretch => (0, 0),
        };

        LetterboxTransform {
            scale_x: resized_w as f64 / width as f64,
            scale_y: resized_h as f64 / height as f64,
            pad_x: pad_x as f64,
            pad_y: pad_y as f64,
            model_width: self.spec.width,
            model_height: self.spec.height,
            source_width: width,
            source_height: height,
        }
    }

    fn resized_size(&self, width: u32, height: u32) -> (u32, u32) {
        match self.spec.resize {
            ResizeMode::Stretch => (self.spec.width, self.spec.height),
            ResizeMode::Letterbox => {
                let scale = (self.spec.width as f64 / width as f64)
                    .min(self.spec.height as f64 / height as f64);
                let w = ((width as f64 * scale).round() as u32).clamp(1, self.spec.width.max(1));
                let h = ((height as f64 * scale).round() as u32).clamp(1, self.spec.height.max(1));
                (w, h)
            }
        }
    }

    /// Resize, pad and normalize `image`
    pub fn prepare(&self, image: &RgbImage) -> Result<ModelInput, CascadeError> {
        self.spec.validate().map_err(CascadeError::ConfigurationInvalid)?;
        ImageUtils::validate_dimensions(image.width(), image.height())?;

        let transform = self.transform_for(image.width(), image.height());
        let (resized_w, resized_h) = self.resized_size(image.width(), image.height());
        let resized = imageops::resize(image, resized_w, resized_h, imageops::FilterType::Triangle);

        let mut canvas = RgbImage::from_pixel(
            self.spec.width,
            self.spec.height,
            image::Rgb(self.spec.pad_color),
        );
        imageops::replace(
            &mut canvas,
            &resized,
            transform.pad_x as i64,
            transform.pad_y as i64,
        );

        let tensor = self.normalize(&canvas);
        Ok(ModelInput {
            image: canvas,
            tensor,
            transform,
        })
    }

    fn normalize(&self, image: &RgbImage) -> Vec<f32> {
        let plane = (image.width() * image.height()) as usize;
        let mut tensor = vec![0.0f32; 3 * plane];

        for (index, pixel) in image.pixels().enumerate() {
            for channel in 0..3 {
                let value = pixel[channel] as f32 / 255.0;
                tensor[channel * plane + index] =
                    (value - self.spec.mean[channel]) / self.spec.std[channel];
            }
        }
        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_letterbox_geometry() {
        let preprocessor = RegionPreprocessor::new(InputSpec::default());
        let transform = preprocessor.transform_for(1280, 720);

        assert_relative_eq!(transform.scale_x, 0.5);
        assert_relative_eq!(transform.scale_y, 0.5);
        assert_eq!(transform.pad_x, 0.0);
        assert_eq!(transform.pad_y, 140.0);
    }

    #[test]
    fn test_prepare_pads_and_normalizes() {
        let preprocessor = RegionPreprocessor::new(InputSpec {
            width: 8,
            height: 8,
            ..Default::default()
        });
        let image = RgbImage::from_pixel(8, 4, image::Rgb([255, 0, 0]));
        let input = preprocessor.prepare(&image).unwrap();

        assert_eq!(input.image.dimensions(), (8, 8));
        assert_eq!(input.tensor.len(), 3 * 64);
        // Top rows are padding, middle rows carry the source
        assert_eq!(input.image.get_pixel(0, 0).0, [114, 114, 114]);
        assert_eq!(input.image.get_pixel(4, 4).0, [255, 0, 0]);
        // Red channel plane at (4, 4)
        assert_relative_eq!(input.tensor[4 * 8 + 4], 1.0);
        // Green channel plane at (4, 4)
        assert_relative_eq!(input.tensor[64 + 4 * 8 + 4], 0.0);
    }

    #[test]
    fn test_stretch_mode() {
        let preprocessor = RegionPreprocessor::new(InputSpec::imagenet(224));
        let transform = preprocessor.transform_for(448, 112);
        assert_relative_eq!(transform.scale_x, 0.5);
        assert_relative_eq!(transform.scale_y, 2.0);
        assert_eq!((transform.pad_x, transform.pad_y), (0.0, 0.0));
    }

    #[test]
    fn test_rejects_invalid_spec() {
        let preprocessor = RegionPreprocessor::new(InputSpec {
            width: 0,
            height: 0,
            ..Default::default()
        });
        let err = preprocessor.prepare(&RgbImage::new(64, 64)).unwrap_err();
        assert!(matches!(err, CascadeError::ConfigurationInvalid(_)));
        // Geometry queries stay total on a bad spec
        let transform = preprocessor.transform_for(64, 64);
        assert_eq!((transform.model_width, transform.model_height), (0, 0));
    }

    #[test]
    fn test_rejects_empty_image() {
        let preprocessor = RegionPreprocessor::new(InputSpec::default());
        let err = preprocessor.prepare(&RgbImage::new(0, 10)).unwrap_err();
        assert!(matches!(err, CascadeError::MalformedInput(_)));
    }
}
