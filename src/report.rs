//! Zone-grouped board report built from cascade output

use cardscan_core::{BoardLayout, BoardZone, CardLabel};
use cardscan_cv::detection::{CascadeOutcome, CascadeStats};
use cardscan_cv::{Detection, SourceMethod};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub label: String,
    pub description: String,
    pub confidence: f64,
    pub source_method: SourceMethod,
    pub region: [f64; 4],
}

impl ReportEntry {
    fn from_detection(detection: &Detection) -> Self {
        let label = detection.class_label().to_string();
        let description = label
            .parse::<CardLabel>()
            .map(|card| card.describe())
            .unwrap_or_else(|_| label.clone());
        Self {
            label,
            description,
            confidence: detection.confidence(),
            source_method: detection.source_method(),
            region: detection.region().as_array(),
        }
    }
}

/// Detections of one capture, grouped by board zone
#[derive(Debug, Clone, Serialize)]
pub struct BoardReport {
    pub zones: BTreeMap<BoardZone, Vec<ReportEntry>>,
    pub detections: Vec<Detection>,
    pub stats: CascadeStats,
}

impl BoardReport {
    /// Group `outcome` by zone of a `board_width` x `board_height` board
    pub fn build(outcome: CascadeOutcome, layout: &BoardLayout, board_width: f64, board_height: f64) -> Self {
        let mut zones: BTreeMap<BoardZone, Vec<ReportEntry>> = BTreeMap::new();
        for detection in &outcome.detections {
            let zone = layout.zone_of(detection.region().as_array(), board_width, board_height);
            zones
                .entry(zone)
                .or_default()
                .push(ReportEntry::from_detection(detection));
        }

        Self {
            zones,
            detections: outcome.detections,
            stats: outcome.stats,
        }
    }

    /// Playing cards found in the hand zone, in reading order
    pub fn hand(&self) -> Vec<CardLabel> {
        self.zones
            .get(&BoardZone::Hand)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.label.parse::<CardLabel>().ok())
            .filter(CardLabel::is_playing_card)
            .collect()
    }
}

impl fmt::Display for BoardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} detections in {}ms{}",
            self.stats.total_detections,
            self.stats.processing_time_ms,
            if self.stats.degraded { " (degraded mode)" } else { "" }
        )?;
        for (zone, entries) in &self.zones {
            writeln!(f, "{:?}:", zone)?;
            for entry in entries {
                writeln!(
                    f,
                    "  {:<24} {:>5.1}%  {:<9} [{:.0}, {:.0}, {:.0}, {:.0}]",
                    entry.description,
                    entry.confidence * 100.0,
                    entry.source_method,
                    entry.region[0],
                    entry.region[1],
                    entry.region[2],
                    entry.region[3]
                )?;
            }
        }
        Ok(())
    }
}
