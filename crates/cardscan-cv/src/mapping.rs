//! Coordinate mapping between model, image and board spaces
//!
//! model-space (normalized input tensor) --letterbox inverse--> image-space
//! (capture pixels) --board frame--> board-space (caller coordinates).
//! Both steps are affine per axis and exactly invertible.

use crate::bbox::{AxisAlignedBox, BoardSpace, ImageSpace, ModelSpace, Space};
use crate::detection::Detection;
use serde::{Deserialize, Serialize};

/// Resize + letterbox transform applied by the region preprocessor.
///
/// `model_px = image_px * scale + pad` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LetterboxTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub pad_x: f64,
    pub pad_y: f64,
    pub model_width: u32,
    pub model_height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl LetterboxTransform {
    /// Transform of an image that is fed to the model unchanged
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            model_width: width,
            model_height: height,
            source_width: width,
            source_height: height,
        }
    }

    /// Map a normalized model-space box back to source image pixels
    pub fn model_to_image(&self, bbox: &AxisAlignedBox<ModelSpace>) -> AxisAlignedBox<ImageSpace> {
        let mw = self.model_width as f64;
        let mh = self.model_height as f64;
        AxisAlignedBox::new(
            (bbox.x_min * mw - self.pad_x) / self.scale_x,
            (bbox.y_min * mh - self.pad_y) / self.scale_y,
            (bbox.x_max * mw - self.pad_x) / self.scale_x,
            (bbox.y_max * mh - self.pad_y) / self.scale_y,
        )
    }

    /// Map a source image box into normalized model space
    pub fn image_to_model(&self, bbox: &AxisAlignedBox<ImageSpace>) -> AxisAlignedBox<ModelSpace> {
        let mw = self.model_width as f64;
        let mh = self.model_height as f64;
        AxisAlignedBox::new(
            (bbox.x_min * self.scale_x + self.pad_x) / mw,
            (bbox.y_min * self.scale_y + self.pad_y) / mh,
            (bbox.x_max * self.scale_x + self.pad_x) / mw,
            (bbox.y_max * self.scale_y + self.pad_y) / mh,
        )
    }
}

/// Placement of the logical board inside the captured image.
///
/// `board = (image_px - origin) * scale`. The default frame makes board
/// coordinates equal to capture pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardFrame {
    pub origin_x: f64,
    pub origin_y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for BoardFrame {
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl BoardFrame {
    /// Frame mapping the capture rectangle `(x, y, width, height)` onto a
    /// board of `board_width` x `board_height` units.
    pub fn from_capture_rect(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        board_width: f64,
        board_height: f64,
    ) -> Self {
        Self {
            origin_x: x,
            origin_y: y,
            scale_x: board_width / width,
            scale_y: board_height / height,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let finite = [self.origin_x, self.origin_y, self.scale_x, self.scale_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err("board frame values must be finite".to_string());
        }
        if self.scale_x <= 0.0 || self.scale_y <= 0.0 {
            return Err(format!(
                "board frame scale must be positive, got ({}, {})",
                self.scale_x, self.scale_y
            ));
        }
        Ok(())
    }

    pub fn image_to_board(&self, bbox: &AxisAlignedBox<ImageSpace>) -> AxisAlignedBox<BoardSpace> {
        AxisAlignedBox::new(
            (bbox.x_min - self.origin_x) * self.scale_x,
            (bbox.y_min - self.origin_y) * self.scale_y,
            (bbox.x_max - self.origin_x) * self.scale_x,
            (bbox.y_max - self.origin_y) * self.scale_y,
        )
    }

    pub fn board_to_image(&self, bbox: &AxisAlignedBox<BoardSpace>) -> AxisAlignedBox<ImageSpace> {
        AxisAlignedBox::new(
            bbox.x_min / self.scale_x + self.origin_x,
            bbox.y_min / self.scale_y + self.origin_y,
            bbox.x_max / self.scale_x + self.origin_x,
            bbox.y_max / self.scale_y + self.origin_y,
        )
    }
}

/// Converts detector boxes into the caller's board coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoordinateMapper {
    frame: BoardFrame,
}

impl CoordinateMapper {
    pub fn new(frame: BoardFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &BoardFrame {
        &self.frame
    }

    /// Model-space box to board-space, inverting the preprocessing transform
    pub fn to_board_space(
        &self,
        bbox: &AxisAlignedBox<ModelSpace>,
        transform: &LetterboxTransform,
    ) -> AxisAlignedBox<BoardSpace> {
        self.frame.image_to_board(&transform.model_to_image(bbox))
    }

    /// Exact inverse of [`CoordinateMapper::to_board_space`]
    pub fn to_model_space(
        &self,
        bbox: &AxisAlignedBox<BoardSpace>,
        transform: &LetterboxTransform,
    ) -> AxisAlignedBox<ModelSpace> {
        transform.image_to_model(&self.frame.board_to_image(bbox))
    }

    pub fn image_to_board(&self, bbox: &AxisAlignedBox<ImageSpace>) -> AxisAlignedBox<BoardSpace> {
        self.frame.image_to_board(bbox)
    }

    /// Re-express an image-space detection in board-space
    pub fn detection_to_board(&self, detection: Detection<ImageSpace>) -> Detection<BoardSpace> {
        detection.map_region(|region| self.frame.image_to_board(region))
    }
}

/// Largest corner displacement between two boxes of the same space
pub fn max_corner_error<S: Space>(a: &AxisAlignedBox<S>, b: &AxisAlignedBox<S>) -> f64 {
    a.as_array()
        .iter()
        .zip(b.as_array().iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
