//! Detection configuration

use crate::Result;
use crate::calibration::CalibrationConfig;
use crate::error::CascadeError;
use crate::heuristic::HeuristicConfig;
use crate::mapping::BoardFrame;
use crate::template::TemplateConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Thresholds steering escalation and merging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Primary detections below this are discarded and their zone searched again by the fallbacks
    pub confidence_escalation_threshold: f64,
    /// Minimum calibrated confidence of any returned detection
    pub final_acceptance_threshold: f64,
    /// Same-class boxes overlapping above this are merged
    pub iou_merge_threshold: f64,
    pub max_detections_per_class: usize,
    /// Confidence window inside which a more trusted method wins a merge
    pub merge_epsilon: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            confidence_escalation_threshold: 0.4,
            final_acceptance_threshold: 0.5,
            iou_merge_threshold: 0.5,
            max_detections_per_class: 8,
            merge_epsilon: 0.05,
        }
    }
}

impl CascadeConfig {
    pub fn validate(&self) -> std::result::Result<(), CascadeError> {
        let unit = [
            ("confidence_escalation_threshold", self.confidence_escalation_threshold),
            ("final_acceptance_threshold", self.final_acceptance_threshold),
            ("iou_merge_threshold", self.iou_merge_threshold),
            ("merge_epsilon", self.merge_epsilon),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(CascadeError::ConfigurationInvalid(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.confidence_escalation_threshold > self.final_acceptance_threshold {
            return Err(CascadeError::ConfigurationInvalid(format!(
                "confidence_escalation_threshold ({}) above final_acceptance_threshold ({})",
                self.confidence_escalation_threshold, self.final_acceptance_threshold
            )));
        }
        if self.max_detections_per_class == 0 {
            return Err(CascadeError::ConfigurationInvalid(
                "max_detections_per_class must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Coarse grid scanned when the primary tier is unavailable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradedGridConfig {
    pub columns: u32,
    pub rows: u32,
    /// Fraction of a cell shared with its neighbour
    pub overlap: f64,
}

impl Default for DegradedGridConfig {
    fn default() -> Self {
        Self {
            columns: 4,
            rows: 3,
            overlap: 0.25,
        }
    }
}

impl DegradedGridConfig {
    /// Overlapping cells `(x, y, width, height)` covering a `width` x `height` image
    pub fn cells(&self, width: u32, height: u32) -> Vec<(u32, u32, u32, u32)> {
        let axis = |extent: u32, count: u32| -> Vec<(u32, u32)> {
            let count = count.max(1);
            let stride = extent as f64 / count as f64;
            let size = (stride * (1.0 + self.overlap)).ceil().min(extent as f64) as u32;
            (0..count)
                .map(|i| {
                    let start = ((i as f64 * stride) as u32).min(extent.saturating_sub(size));
                    (start, size.max(1))
                })
                .collect()
        };

        let columns = axis(width, self.columns);
        let rows = axis(height, self.rows);
        rows.iter()
            .flat_map(|&(y, h)| columns.iter().map(move |&(x, w)| (x, y, w, h)))
            .collect()
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.columns == 0 || self.rows == 0 {
            return Err(format!(
                "degraded grid needs at least one cell, got {}x{}",
                self.columns, self.rows
            ));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(format!("degraded grid overlap must be in [0, 1), got {}", self.overlap));
        }
        Ok(())
    }
}

/// Main detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub cascade: CascadeConfig,
    pub template: TemplateConfig,
    pub heuristic: HeuristicConfig,
    pub calibration: CalibrationConfig,
    /// Escalated regions grow by this fraction of their size on every side
    pub region_padding: f64,
    pub degraded_grid: DegradedGridConfig,
    /// Per detector call; `None` waits indefinitely
    pub stage_timeout_ms: Option<u64>,
    pub board_frame: BoardFrame,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cascade: CascadeConfig::default(),
            template: TemplateConfig::default(),
            heuristic: HeuristicConfig::default(),
            calibration: CalibrationConfig::default(),
            region_padding: 0.15,
            degraded_grid: DegradedGridConfig::default(),
            stage_timeout_ms: None,
            board_frame: BoardFrame::default(),
        }
    }
}

impl DetectionConfig {
    /// Load a JSON configuration; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: DetectionConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Rejected config: {:?}", path))?;
        Ok(config)
    }

    /// Histogram-equalized template matching for dim or glaring captures
    pub fn for_uneven_lighting() -> Self {
        Self {
            template: TemplateConfig::for_uneven_lighting(),
            ..Default::default()
        }
    }

    /// Sobel-gradient template matching for captures with shifted colors
    pub fn edge_matching() -> Self {
        Self {
            template: TemplateConfig::edge_matching(),
            ..Default::default()
        }
    }

    /// Bounded stage latency and a coarser fallback grid
    pub fn low_latency() -> Self {
        Self {
            stage_timeout_ms: Some(250),
            degraded_grid: DegradedGridConfig {
                columns: 2,
                rows: 2,
                overlap: 0.2,
            },
            ..Default::default()
        }
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> std::result::Result<(), CascadeError> {
        let invalid = CascadeError::ConfigurationInvalid;
        self.cascade.validate()?;
        self.template.validate().map_err(invalid)?;
        self.heuristic.validate().map_err(invalid)?;
        self.calibration.validate().map_err(invalid)?;
        self.degraded_grid.validate().map_err(invalid)?;
        self.board_frame.validate().map_err(invalid)?;
        if !(self.region_padding.is_finite() && self.region_padding >= 0.0) {
            return Err(invalid(format!(
                "region_padding must be non-negative, got {}",
                self.region_padding
            )));
        }
        if self.stage_timeout_ms == Some(0) {
            return Err(invalid("stage_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}
