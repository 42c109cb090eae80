//! Cascade orchestrator
//!
//! One primary pass over the whole capture, then per-region escalation
//! through the template and heuristic tiers, then cross-method merging and
//! mapping into board coordinates.

use super::config::DetectionConfig;
use super::stage::{CandidateRegion, RegionOrigin, run_stage};
use super::state::{EscalationState, TierOutcome};
use super::{CancellationToken, Detection, RawDetection, SourceMethod};
use crate::bbox::{AxisAlignedBox, ImageSpace};
use crate::error::CascadeError;
use crate::heuristic::HeuristicMatcher;
use crate::mapping::CoordinateMapper;
use crate::primary::{ArtifactRegistry, PrimaryDetector};
use crate::template::TemplateMatcher;
use crate::traits::Detector;
use crate::utils::{Deduplicator, ImageUtils};
use image::RgbImage;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Per-request counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeStats {
    pub primary_accepted: usize,
    pub regions_escalated: usize,
    pub regions_resolved: usize,
    /// Primary tier failed and the degraded grid was scanned
    pub degraded: bool,
    pub total_detections: usize,
    pub processing_time_ms: u64,
}

/// Detections of one request together with its statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeOutcome {
    pub detections: Vec<Detection>,
    pub stats: CascadeStats,
}

/// Primary output split by the two cascade thresholds
#[derive(Debug, Default)]
struct PrimaryPartition {
    accepted: Vec<Detection<ImageSpace>>,
    ambiguous: Vec<AxisAlignedBox<ImageSpace>>,
    recovery: Vec<AxisAlignedBox<ImageSpace>>,
}

/// Multi-method detection cascade.
///
/// Holds the tiers in cascade order and looks a tier up by the
/// [`SourceMethod`] an escalation state is pending on.
pub struct CascadeDetector {
    config: DetectionConfig,
    tiers: Vec<Arc<dyn Detector>>,
    mapper: CoordinateMapper,
    deduplicator: Deduplicator,
}

impl CascadeDetector {
    /// Standard three-tier cascade over the registry's artifact and library
    pub fn new(config: DetectionConfig, registry: Arc<ArtifactRegistry>) -> Result<Self, CascadeError> {
        config.validate()?;
        let library = Arc::clone(registry.library());
        let tiers: Vec<Arc<dyn Detector>> = vec![
            Arc::new(PrimaryDetector::new(registry)),
            Arc::new(TemplateMatcher::new(Arc::clone(&library), config.template.clone())),
            Arc::new(HeuristicMatcher::new(&library, config.heuristic.clone())),
        ];
        Self::with_tiers(config, tiers)
    }

    /// Cascade over caller-supplied tiers. A missing tier counts as a failed
    /// one: without a primary tier every request runs degraded.
    pub fn with_tiers(config: DetectionConfig, tiers: Vec<Arc<dyn Detector>>) -> Result<Self, CascadeError> {
        config.validate()?;
        for (i, tier) in tiers.iter().enumerate() {
            if tiers[..i].iter().any(|t| t.method() == tier.method()) {
                return Err(CascadeError::ConfigurationInvalid(format!(
                    "more than one {} tier",
                    tier.method()
                )));
            }
        }

        Ok(Self {
            mapper: CoordinateMapper::new(config.board_frame),
            deduplicator: Deduplicator::from_config(&config.cascade),
            config,
            tiers,
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, CascadeError> {
        self.detect_with_cancel(image, &CancellationToken::new())
    }

    pub fn detect_with_cancel(
        &self,
        image: &RgbImage,
        token: &CancellationToken,
    ) -> Result<Vec<Detection>, CascadeError> {
        Ok(self.detect_with_stats(image, token)?.detections)
    }

    /// Decode an image file and detect on it; undecodable files are `MalformedInput`
    pub fn detect_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Detection>, CascadeError> {
        let image = ImageUtils::load_rgb(&path)
            .map_err(|e| CascadeError::MalformedInput(format!("{:#}", e)))?;
        self.detect(&image)
    }

    pub fn detect_with_stats(
        &self,
        image: &RgbImage,
        token: &CancellationToken,
    ) -> Result<CascadeOutcome, CascadeError> {
        let start_time = Instant::now();
        ImageUtils::validate_dimensions(image.width(), image.height())?;
        token.check()?;

        let source = Arc::new(image.clone());
        let mut stats = CascadeStats::default();

        let (accepted, regions) = match self.run_primary(&source)? {
            Some(partition) => {
                let regions = self.escalated_regions(&source, &partition);
                (partition.accepted, regions)
            }
            None => {
                stats.degraded = true;
                (Vec::new(), self.degraded_regions(&source))
            }
        };
        stats.primary_accepted = accepted.len();
        stats.regions_escalated = regions.len();

        let resolved = self.resolve_regions(&regions, &source, token)?;
        stats.regions_resolved = resolved.iter().filter(|r| !r.is_empty()).count();

        token.check()?;
        let candidates: Vec<_> = accepted.into_iter().chain(resolved.into_iter().flatten()).collect();
        let mut detections: Vec<Detection> = self
            .deduplicator
            .merge(candidates)
            .into_iter()
            .map(|d| self.mapper.detection_to_board(d))
            .collect();
        detections.sort_by(|a, b| a.position_cmp(b));

        stats.total_detections = detections.len();
        stats.processing_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            "cascade: {} detections ({} primary, {}/{} regions resolved{}) in {}ms",
            stats.total_detections,
            stats.primary_accepted,
            stats.regions_resolved,
            stats.regions_escalated,
            if stats.degraded { ", degraded" } else { "" },
            stats.processing_time_ms
        );

        Ok(CascadeOutcome { detections, stats })
    }

    fn tier(&self, method: SourceMethod) -> Option<&Arc<dyn Detector>> {
        self.tiers.iter().find(|tier| tier.method() == method)
    }

    /// Map a raw score onto the shared confidence scale
    fn calibrate(&self, method: SourceMethod, raw: f64) -> f64 {
        let calibration = &self.config.calibration;
        match method {
            SourceMethod::Primary => calibration.primary.apply(raw),
            SourceMethod::Template => calibration.template.apply(raw),
            SourceMethod::Heuristic => calibration.heuristic.apply(raw),
        }
    }

    /// Whole-image primary pass; `None` switches the request to degraded mode
    fn run_primary(&self, source: &Arc<RgbImage>) -> Result<Option<PrimaryPartition>, CascadeError> {
        let Some(primary) = self.tier(SourceMethod::Primary) else {
            tracing::warn!("no primary tier configured, running degraded");
            return Ok(None);
        };

        let raw = match run_stage(primary, source, self.config.stage_timeout()) {
            Ok(raw) => raw,
            Err(e) if e.is_recoverable() => {
                tracing::warn!("primary tier failed, running degraded: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let cascade = &self.config.cascade;
        let mut partition = PrimaryPartition::default();
        for detection in raw {
            let confidence = self.calibrate(SourceMethod::Primary, detection.score);
            if confidence >= cascade.final_acceptance_threshold {
                partition.accepted.push(Detection::new(
                    detection.region,
                    detection.class_label,
                    confidence,
                    SourceMethod::Primary,
                ));
            } else if confidence >= cascade.confidence_escalation_threshold {
                partition.ambiguous.push(detection.region);
            } else {
                tracing::debug!(
                    "primary {} at {:.3} below escalation, re-probing zone",
                    detection.class_label,
                    confidence
                );
                partition.recovery.push(detection.region);
            }
        }

        tracing::debug!(
            "primary: {} accepted, {} ambiguous, {} recovery",
            partition.accepted.len(),
            partition.ambiguous.len(),
            partition.recovery.len()
        );
        Ok(Some(partition))
    }

    fn escalated_regions(&self, source: &RgbImage, partition: &PrimaryPartition) -> Vec<CandidateRegion> {
        let tagged = partition
            .ambiguous
            .iter()
            .map(|r| (r, RegionOrigin::Ambiguous))
            .chain(partition.recovery.iter().map(|r| (r, RegionOrigin::Recovery)));

        tagged
            .filter_map(|(region, origin)| {
                CandidateRegion::crop(source, &region.pad(self.config.region_padding), origin)
            })
            .collect()
    }

    fn degraded_regions(&self, source: &RgbImage) -> Vec<CandidateRegion> {
        self.config
            .degraded_grid
            .cells(source.width(), source.height())
            .into_iter()
            .filter_map(|(x, y, w, h)| {
                let bounds = AxisAlignedBox::from_xywh(x as f64, y as f64, w as f64, h as f64);
                CandidateRegion::crop(source, &bounds, RegionOrigin::DegradedGrid)
            })
            .collect()
    }

    /// Escalate every region; results keep region order
    fn resolve_regions(
        &self,
        regions: &[CandidateRegion],
        source: &RgbImage,
        token: &CancellationToken,
    ) -> Result<Vec<Vec<Detection<ImageSpace>>>, CascadeError> {
        #[cfg(feature = "parallel")]
        let resolved = {
            use rayon::prelude::*;
            regions
                .par_iter()
                .map(|region| self.resolve_region(region, source, token))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let resolved = regions
            .iter()
            .map(|region| self.resolve_region(region, source, token))
            .collect();

        resolved
    }

    fn resolve_region(
        &self,
        region: &CandidateRegion,
        source: &RgbImage,
        token: &CancellationToken,
    ) -> Result<Vec<Detection<ImageSpace>>, CascadeError> {
        token.check()?;

        // The primary tier already ran over the whole capture
        let mut state = EscalationState::PendingTemplate;
        while let Some(method) = state.pending_method() {
            token.check()?;
            let outcome = match self.tier(method) {
                Some(tier) => self.run_tier(tier, region, source),
                None => TierOutcome::Failed,
            };
            state = state.advance(outcome);
        }

        if state == EscalationState::Unresolved {
            tracing::debug!(
                "{:?} region at {:?} yielded no detection",
                region.origin,
                region.bounds.as_array()
            );
        }
        Ok(state.into_detections())
    }

    fn run_tier(&self, tier: &Arc<dyn Detector>, region: &CandidateRegion, source: &RgbImage) -> TierOutcome {
        let method = tier.method();
        let raw = match run_stage(tier, &region.image, self.config.stage_timeout()) {
            Ok(raw) => raw,
            Err(e @ CascadeError::InferenceTimeout { .. }) => {
                tracing::debug!("{} on {:?} region", e, region.origin);
                return TierOutcome::TimedOut;
            }
            Err(e) => {
                tracing::warn!("{} tier failed on region: {}", method, e);
                return TierOutcome::Failed;
            }
        };

        let accepted: Vec<_> = raw
            .into_iter()
            .filter_map(|detection| self.accept(method, detection, region, source))
            .collect();

        if accepted.is_empty() {
            tracing::debug!(
                "{} found nothing acceptable in {:?} region",
                method,
                region.origin
            );
            TierOutcome::Rejected
        } else {
            TierOutcome::Accepted(accepted)
        }
    }

    /// Calibrate and move a region-relative detection into image space
    fn accept(
        &self,
        method: SourceMethod,
        detection: RawDetection,
        region: &CandidateRegion,
        source: &RgbImage,
    ) -> Option<Detection<ImageSpace>> {
        let confidence = self.calibrate(method, detection.score);
        if confidence < self.config.cascade.final_acceptance_threshold {
            return None;
        }

        let placed = detection
            .region
            .translate(region.bounds.x_min, region.bounds.y_min)
            .clip(source.width() as f64, source.height() as f64);
        if placed.is_empty() {
            return None;
        }
        Some(Detection::new(placed, detection.class_label, confidence, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::CascadeConfig;
    use std::sync::Mutex;

    /// Tier returning fixed region-relative detections and recording calls
    struct Scripted {
        method: SourceMethod,
        output: Vec<RawDetection>,
        calls: Mutex<Vec<(u32, u32)>>,
    }

    impl Scripted {
        fn new(method: SourceMethod, output: Vec<RawDetection>) -> Arc<Self> {
            Arc::new(Self {
                method,
                output,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl Detector for Scripted {
        fn method(&self) -> SourceMethod {
            self.method
        }

        fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, CascadeError> {
            self.calls.lock().unwrap().push(image.dimensions());
            Ok(self.output.clone())
        }
    }

    fn raw(x: f64, y: f64, label: &str, score: f64) -> RawDetection {
        RawDetection::new(AxisAlignedBox::from_xywh(x, y, 20.0, 28.0), label, score)
    }

    #[test]
    fn test_primary_thresholds_partition() {
        let primary = Scripted::new(
            SourceMethod::Primary,
            vec![
                raw(10.0, 10.0, "KS", 0.9),
                raw(60.0, 10.0, "QH", 0.45),
                raw(110.0, 10.0, "2C", 0.1),
            ],
        );
        let template = Scripted::new(SourceMethod::Template, vec![]);
        let tiers: Vec<Arc<dyn Detector>> = vec![primary, template.clone()];
        let detector = CascadeDetector::with_tiers(
            DetectionConfig {
                region_padding: 0.0,
                ..Default::default()
            },
            tiers,
        )
        .unwrap();

        let outcome = detector
            .detect_with_stats(&RgbImage::new(200, 100), &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.stats.primary_accepted, 1);
        assert_eq!(outcome.stats.regions_escalated, 2);
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].class_label(), "KS");
        // Ambiguous and recovery crops reach the template tier
        assert_eq!(*template.calls.lock().unwrap(), vec![(20, 28), (20, 28)]);
    }

    #[test]
    fn test_region_detections_translated_to_image() {
        let primary = Scripted::new(SourceMethod::Primary, vec![raw(40.0, 30.0, "KS", 0.45)]);
        let template = Scripted::new(
            SourceMethod::Template,
            vec![RawDetection::new(AxisAlignedBox::from_xywh(0.0, 0.0, 20.0, 28.0), "KS", 0.9)],
        );
        let tiers: Vec<Arc<dyn Detector>> = vec![primary, template];
        let detector = CascadeDetector::with_tiers(
            DetectionConfig {
                region_padding: 0.0,
                ..Default::default()
            },
            tiers,
        )
        .unwrap();

        let found = detector.detect(&RgbImage::new(200, 100)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].region().as_array(), [40.0, 30.0, 60.0, 58.0]);
        assert_eq!(found[0].source_method(), SourceMethod::Template);
    }

    #[test]
    fn test_duplicate_tiers_rejected() {
        let tiers: Vec<Arc<dyn Detector>> = vec![
            Scripted::new(SourceMethod::Template, vec![]),
            Scripted::new(SourceMethod::Template, vec![]),
        ];
        assert!(matches!(
            CascadeDetector::with_tiers(DetectionConfig::default(), tiers),
            Err(CascadeError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let config = DetectionConfig {
            cascade: CascadeConfig {
                max_detections_per_class: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            CascadeDetector::with_tiers(config, vec![]),
            Err(CascadeError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn test_malformed_input() {
        let detector = CascadeDetector::with_tiers(DetectionConfig::default(), vec![]).unwrap();
        assert!(matches!(
            detector.detect(&RgbImage::new(0, 0)),
            Err(CascadeError::MalformedInput(_))
        ));
    }
}
