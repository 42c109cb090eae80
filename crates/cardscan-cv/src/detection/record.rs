//! Detection records produced by the cascade tiers

use crate::bbox::{AxisAlignedBox, BoardSpace, ImageSpace, Space};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Cascade tier that produced a detection.
///
/// Declaration order is precedence order: on a confidence tie the earlier
/// method wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceMethod {
    Primary,
    Template,
    Heuristic,
}

impl SourceMethod {
    /// Lower is preferred
    pub fn precedence(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SourceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceMethod::Primary => "PRIMARY",
            SourceMethod::Template => "TEMPLATE",
            SourceMethod::Heuristic => "HEURISTIC",
        };
        f.write_str(name)
    }
}

/// Uncalibrated detector output, relative to the image the detector was given
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub region: AxisAlignedBox<ImageSpace>,
    pub class_label: String,
    pub score: f64,
}

impl RawDetection {
    pub fn new(region: AxisAlignedBox<ImageSpace>, class_label: impl Into<String>, score: f64) -> Self {
        Self {
            region,
            class_label: class_label.into(),
            score,
        }
    }
}

/// An identified board element. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Detection<S: Space = BoardSpace> {
    region: AxisAlignedBox<S>,
    class_label: String,
    confidence: f64,
    source_method: SourceMethod,
}

impl<S: Space> Detection<S> {
    pub fn new(
        region: AxisAlignedBox<S>,
        class_label: impl Into<String>,
        confidence: f64,
        source_method: SourceMethod,
    ) -> Self {
        Self {
            region,
            class_label: class_label.into(),
            confidence,
            source_method,
        }
    }

    pub fn region(&self) -> &AxisAlignedBox<S> {
        &self.region
    }

    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn source_method(&self) -> SourceMethod {
        self.source_method
    }

    /// Same detection re-expressed in another coordinate space
    pub(crate) fn map_region<T: Space>(
        self,
        f: impl FnOnce(&AxisAlignedBox<S>) -> AxisAlignedBox<T>,
    ) -> Detection<T> {
        Detection {
            region: f(&self.region),
            class_label: self.class_label,
            confidence: self.confidence,
            source_method: self.source_method,
        }
    }

    /// Ranking used for suppression: confidence descending, then source
    /// precedence, then position so equal candidates order deterministically.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| self.source_method.cmp(&other.source_method))
            .then_with(|| self.position_cmp(other))
    }

    /// Reading order: left to right, then top to bottom, then label
    pub fn position_cmp(&self, other: &Self) -> Ordering {
        self.region
            .x_min
            .total_cmp(&other.region.x_min)
            .then_with(|| self.region.y_min.total_cmp(&other.region.y_min))
            .then_with(|| self.class_label.cmp(&other.class_label))
            .then_with(|| self.source_method.cmp(&other.source_method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: f64, confidence: f64, method: SourceMethod) -> Detection<ImageSpace> {
        Detection::new(AxisAlignedBox::from_xywh(x, 0.0, 10.0, 10.0), "KS", confidence, method)
    }

    #[test]
    fn test_precedence_order() {
        assert!(SourceMethod::Primary.precedence() < SourceMethod::Template.precedence());
        assert!(SourceMethod::Template.precedence() < SourceMethod::Heuristic.precedence());
    }

    #[test]
    fn test_rank_cmp() {
        let high = detection(50.0, 0.9, SourceMethod::Heuristic);
        let low = detection(0.0, 0.6, SourceMethod::Primary);
        assert_eq!(high.rank_cmp(&low), Ordering::Less);

        let primary = detection(10.0, 0.7, SourceMethod::Primary);
        let template = detection(0.0, 0.7, SourceMethod::Template);
        assert_eq!(primary.rank_cmp(&template), Ordering::Less);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(detection(1.0, 0.9, SourceMethod::Template)).unwrap();
        assert_eq!(json["class_label"], "KS");
        assert_eq!(json["source_method"], "TEMPLATE");
        assert_eq!(json["region"]["x_min"], 1.0);
    }
}
