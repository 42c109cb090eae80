//! Axis-aligned boxes tagged with their coordinate space
//!
//! A box produced in model input coordinates cannot be compared with one in
//! source image pixels without going through the coordinate mapper: the
//! space is a type parameter, so mixing spaces fails to compile.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Runtime name of a coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    /// Normalized `[0, 1]` coordinates of the primary detector's input tensor
    Model,
    /// Pixel coordinates of the captured source image
    Image,
    /// Caller coordinates of the logical game board
    Board,
}

/// Marker trait for coordinate spaces.
pub trait Space: fmt::Debug + Clone + Copy + PartialEq + Send + Sync + 'static {
    const KIND: CoordinateSpace;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardSpace;

impl Space for ModelSpace {
    const KIND: CoordinateSpace = CoordinateSpace::Model;
}

impl Space for ImageSpace {
    const KIND: CoordinateSpace = CoordinateSpace::Image;
}

impl Space for BoardSpace {
    const KIND: CoordinateSpace = CoordinateSpace::Board;
}

/// Axis-aligned box `[x_min, x_max] x [y_min, y_max]` in space `S`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AxisAlignedBox<S: Space> {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    #[serde(skip)]
    space: PhantomData<S>,
}

impl<S: Space> AxisAlignedBox<S> {
    /// Create a box from two corners, in either order
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x_min: x0.min(x1),
            y_min: y0.min(y1),
            x_max: x0.max(x1),
            y_max: y0.max(y1),
            space: PhantomData,
        }
    }

    /// Create from top-left corner and size
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn space(&self) -> CoordinateSpace {
        S::KIND
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn is_finite(&self) -> bool {
        [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }

    /// Overlapping part of two boxes, if any
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let x_min = self.x_min.max(other.x_min);
        let y_min = self.y_min.max(other.y_min);
        let x_max = self.x_max.min(other.x_max);
        let y_max = self.y_max.min(other.y_max);

        if x_max <= x_min || y_max <= y_min {
            return None;
        }
        Some(Self::new(x_min, y_min, x_max, y_max))
    }

    /// Calculate intersection over union (IoU) with another box
    pub fn iou(&self, other: &Self) -> f64 {
        let Some(intersection) = self.intersection(other) else {
            return 0.0;
        };
        let intersection = intersection.area();
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// Check if this box overlaps with another above `threshold`
    pub fn overlaps(&self, other: &Self, threshold: f64) -> bool {
        self.iou(other) > threshold
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x_min + dx, self.y_min + dy, self.x_max + dx, self.y_max + dy)
    }

    /// Grow each side by `fraction` of the box size
    pub fn pad(&self, fraction: f64) -> Self {
        let dx = self.width() * fraction;
        let dy = self.height() * fraction;
        Self::new(
            self.x_min - dx,
            self.y_min - dy,
            self.x_max + dx,
            self.y_max + dy,
        )
    }

    /// Clamp to `[0, width] x [0, height]`
    pub fn clip(&self, width: f64, height: f64) -> Self {
        Self::new(
            self.x_min.clamp(0.0, width),
            self.y_min.clamp(0.0, height),
            self.x_max.clamp(0.0, width),
            self.y_max.clamp(0.0, height),
        )
    }
}

impl AxisAlignedBox<ImageSpace> {
    /// Integer pixel rectangle `(x, y, width, height)` covering the box
    /// inside a `width` x `height` image, or `None` if nothing remains.
    pub fn pixel_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clipped = self.clip(width as f64, height as f64);
        let x0 = clipped.x_min.floor() as u32;
        let y0 = clipped.y_min.floor() as u32;
        let x1 = (clipped.x_max.ceil() as u32).min(width);
        let y1 = (clipped.y_max.ceil() as u32).min(height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bbox_iou() {
        let box1 = AxisAlignedBox::<ImageSpace>::from_xywh(0.0, 0.0, 10.0, 10.0);
        let box2 = AxisAlignedBox::<ImageSpace>::from_xywh(5.0, 5.0, 10.0, 10.0);

        // 25 / (100 + 100 - 25)
        assert_relative_eq!(box1.iou(&box2), 25.0 / 175.0, epsilon = 1e-12);
        assert_relative_eq!(box1.iou(&box1), 1.0);

        let far = AxisAlignedBox::<ImageSpace>::from_xywh(50.0, 50.0, 5.0, 5.0);
        assert_eq!(box1.iou(&far), 0.0);
    }

    #[test]
    fn test_degenerate_boxes() {
        let point = AxisAlignedBox::<ImageSpace>::new(3.0, 3.0, 3.0, 3.0);
        assert!(point.is_empty());
        assert_eq!(point.iou(&point), 0.0);

        let swapped = AxisAlignedBox::<BoardSpace>::new(10.0, 8.0, 2.0, 1.0);
        assert_eq!(swapped.as_array(), [2.0, 1.0, 10.0, 8.0]);
        assert_eq!(swapped.space(), CoordinateSpace::Board);
    }

    #[test]
    fn test_pad_and_pixel_rect() {
        let bbox = AxisAlignedBox::<ImageSpace>::from_xywh(10.0, 10.0, 20.0, 40.0);
        let padded = bbox.pad(0.25);
        assert_eq!(padded.as_array(), [5.0, 0.0, 35.0, 60.0]);

        assert_eq!(padded.pixel_rect(32, 100), Some((5, 0, 27, 60)));
        assert_eq!(bbox.translate(200.0, 0.0).pixel_rect(100, 100), None);
    }
}
