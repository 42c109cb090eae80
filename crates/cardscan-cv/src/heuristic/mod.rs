//! Heuristic CV matcher: edges, contours, shape filter, color signature

pub mod histogram;
pub mod matcher;

pub use histogram::ColorHistogram;
pub use matcher::HeuristicMatcher;

use serde::{Deserialize, Serialize};

/// Heuristic matcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Canny low threshold
    pub canny_low: f32,
    /// Canny high threshold
    pub canny_high: f32,
    /// Dilation radius closing gaps in the edge map (0 disables)
    pub dilate_radius: u8,
    /// Minimum bounding-rectangle area in pixels
    pub min_area: u32,
    /// Accepted width / height window
    pub aspect_range: (f64, f64),
    /// Width / height of a card face
    pub target_aspect: f64,
    /// Raw scores below this are dropped before calibration
    pub min_score: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            dilate_radius: 1,
            min_area: 1000,
            aspect_range: (0.4, 1.2),
            target_aspect: 0.71,
            min_score: 0.1,
        }
    }
}

impl HeuristicConfig {
    /// Small icons and chips rather than full cards
    pub fn for_icons() -> Self {
        Self {
            min_area: 150,
            aspect_range: (0.6, 1.6),
            target_aspect: 1.0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.canny_low > self.canny_high {
            return Err(format!(
                "heuristic canny_low ({}) above canny_high ({})",
                self.canny_low, self.canny_high
            ));
        }
        let (low, high) = self.aspect_range;
        if !(low > 0.0 && low <= high && high.is_finite()) {
            return Err(format!("invalid aspect range ({}, {})", low, high));
        }
        if !(self.target_aspect.is_finite() && self.target_aspect > 0.0) {
            return Err(format!("target aspect must be positive, got {}", self.target_aspect));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(format!("heuristic min_score must be in [0, 1], got {}", self.min_score));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(HeuristicConfig::default().validate().is_ok());
        assert!(HeuristicConfig::for_icons().validate().is_ok());

        let config = HeuristicConfig {
            aspect_range: (1.2, 0.4),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
