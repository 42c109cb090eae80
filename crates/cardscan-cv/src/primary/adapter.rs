//! Adapter running the registered artifact on whole captures

use super::ArtifactRegistry;
use crate::detection::{RawDetection, SourceMethod};
use crate::error::CascadeError;
use crate::preprocess::RegionPreprocessor;
use crate::traits::Detector;
use image::RgbImage;
use std::sync::Arc;

/// Primary tier: preprocess, infer, map boxes back to image pixels
pub struct PrimaryDetector {
    registry: Arc<ArtifactRegistry>,
}

impl PrimaryDetector {
    pub fn new(registry: Arc<ArtifactRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }
}

impl Detector for PrimaryDetector {
    fn method(&self) -> SourceMethod {
        SourceMethod::Primary
    }

    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, CascadeError> {
        let guard = self.registry.read_artifact();
        let artifact = guard
            .as_ref()
            .ok_or_else(|| CascadeError::ArtifactUnavailable("no detector artifact installed".to_string()))?;

        artifact.input_spec().validate().map_err(|msg| {
            CascadeError::ArtifactUnavailable(format!("artifact '{}' declares a bad input: {}", artifact.name(), msg))
        })?;
        let input = RegionPreprocessor::new(artifact.input_spec().clone()).prepare(image)?;
        let outputs = artifact.infer(&input)?;

        let (width, height) = (image.width() as f64, image.height() as f64);
        let labels = artifact.labels();
        let mut detections = Vec::with_capacity(outputs.len());
        for output in outputs {
            let Some(label) = labels.get(output.class_index) else {
                tracing::warn!(
                    "artifact '{}' emitted unknown class index {}",
                    artifact.name(),
                    output.class_index
                );
                continue;
            };
            if !output.region.is_finite() || !output.score.is_finite() {
                tracing::warn!("artifact '{}' emitted a non-finite box or score", artifact.name());
                continue;
            }

            let region = input.transform.model_to_image(&output.region).clip(width, height);
            if region.is_empty() {
                continue;
            }
            detections.push(RawDetection::new(region, label.clone(), output.score));
        }

        tracing::debug!(
            "artifact '{}' produced {} detections",
            artifact.name(),
            detections.len()
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primary::registry::tests::{FixedArtifact, output};
    use crate::template::ReferenceLibrary;
    use approx::assert_relative_eq;

    fn registry_with(outputs: Vec<crate::primary::ArtifactOutput>) -> Arc<ArtifactRegistry> {
        Arc::new(ArtifactRegistry::with_artifact(
            Arc::new(ReferenceLibrary::new()),
            Arc::new(FixedArtifact::new("fixed", outputs)),
        ))
    }

    #[test]
    fn test_unavailable_without_artifact() {
        let detector = PrimaryDetector::new(Arc::new(ArtifactRegistry::new(Arc::new(ReferenceLibrary::new()))));
        let err = detector.infer(&RgbImage::new(32, 32)).unwrap_err();
        assert!(matches!(err, CascadeError::ArtifactUnavailable(_)));
    }

    #[test]
    fn test_boxes_mapped_through_letterbox() {
        // 128x64 source letterboxed into 64x64: scale 0.5, pad_y 16
        let detector = PrimaryDetector::new(registry_with(vec![output(0.25, 0.25, 0.5, 0.75, 0, 0.9)]));
        let found = detector.infer(&RgbImage::new(128, 64)).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_label, "KS");
        let [x0, y0, x1, y1] = found[0].region.as_array();
        assert_relative_eq!(x0, 32.0);
        assert_relative_eq!(y0, 0.0);
        assert_relative_eq!(x1, 64.0);
        assert_relative_eq!(y1, 64.0);
    }

    #[test]
    fn test_bad_input_spec_is_unavailable() {
        let mut artifact = FixedArtifact::new("corrupt", vec![output(0.1, 0.1, 0.3, 0.3, 0, 0.9)]);
        artifact.spec.width = 0;
        artifact.spec.height = 0;
        let registry = ArtifactRegistry::with_artifact(Arc::new(ReferenceLibrary::new()), Arc::new(artifact));
        let detector = PrimaryDetector::new(Arc::new(registry));

        let err = detector.infer(&RgbImage::new(64, 64)).unwrap_err();
        assert!(matches!(err, CascadeError::ArtifactUnavailable(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_class_skipped() {
        let detector = PrimaryDetector::new(registry_with(vec![
            output(0.1, 0.1, 0.3, 0.3, 7, 0.9),
            output(0.1, 0.3, 0.3, 0.6, 1, 0.8),
        ]));
        let found = detector.infer(&RgbImage::new(64, 64)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_label, "joker_sun");
    }
}
