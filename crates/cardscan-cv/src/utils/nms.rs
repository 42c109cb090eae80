//! Cross-method non-maximum suppression
//!
//! Detections from all three tiers meet here. Suppression is class-aware and
//! ignores which tier produced a box, except that a higher-precedence source
//! takes over an overlapping box when the two confidences are within
//! `merge_epsilon` of each other.

use crate::bbox::Space;
use crate::detection::{CascadeConfig, Detection};
use std::collections::BTreeMap;

/// Generalized NMS over heterogeneous detection sources
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deduplicator {
    pub iou_threshold: f64,
    pub epsilon: f64,
    pub max_per_class: usize,
}

impl Deduplicator {
    pub fn new(iou_threshold: f64, epsilon: f64, max_per_class: usize) -> Self {
        Self {
            iou_threshold,
            epsilon,
            max_per_class,
        }
    }

    pub fn from_config(config: &CascadeConfig) -> Self {
        Self::new(
            config.iou_merge_threshold,
            config.merge_epsilon,
            config.max_detections_per_class,
        )
    }

    /// Merge detections; output is grouped by label, highest confidence first
    pub fn merge<S: Space>(&self, detections: Vec<Detection<S>>) -> Vec<Detection<S>> {
        let mut class_groups: BTreeMap<String, Vec<Detection<S>>> = BTreeMap::new();
        for detection in detections {
            class_groups
                .entry(detection.class_label().to_string())
                .or_default()
                .push(detection);
        }

        class_groups
            .into_values()
            .flat_map(|group| self.merge_class(group))
            .collect()
    }

    fn merge_class<S: Space>(&self, mut candidates: Vec<Detection<S>>) -> Vec<Detection<S>> {
        candidates.sort_by(|a, b| a.rank_cmp(b));

        let mut kept: Vec<Detection<S>> = Vec::new();
        for candidate in candidates {
            let overlapping: Vec<usize> = kept
                .iter()
                .enumerate()
                .filter(|(_, accepted)| accepted.region().overlaps(candidate.region(), self.iou_threshold))
                .map(|(index, _)| index)
                .collect();

            match overlapping.as_slice() {
                [] => kept.push(candidate),
                [only] if self.takes_over(&candidate, &kept[*only]) => {
                    tracing::debug!(
                        "{} {} replaces {} {} ({:.3} vs {:.3})",
                        candidate.source_method(),
                        candidate.class_label(),
                        kept[*only].source_method(),
                        kept[*only].class_label(),
                        candidate.confidence(),
                        kept[*only].confidence()
                    );
                    kept[*only] = candidate;
                }
                _ => {
                    tracing::trace!(
                        "suppressed {} {} at {:?}",
                        candidate.source_method(),
                        candidate.class_label(),
                        candidate.region().as_array()
                    );
                }
            }
        }

        kept.sort_by(|a, b| a.rank_cmp(b));
        if kept.len() > self.max_per_class {
            tracing::debug!(
                "capping {} detections of {} at {}",
                kept.len(),
                kept[0].class_label(),
                self.max_per_class
            );
            kept.truncate(self.max_per_class);
        }
        kept
    }

    /// A lower-ranked candidate wins a conflict only with a more trusted
    /// source and a confidence within epsilon.
    fn takes_over<S: Space>(&self, candidate: &Detection<S>, accepted: &Detection<S>) -> bool {
        candidate.source_method().precedence() < accepted.source_method().precedence()
            && accepted.confidence() - candidate.confidence() <= self.epsilon
    }
}
