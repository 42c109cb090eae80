//! Card Scan Computer Vision Library
//!
//! Detection cascade for game-board elements: a primary learned detector,
//! a template matcher and a heuristic matcher, reconciled into a single
//! list of board-space detections.

pub mod bbox;
pub mod calibration;
pub mod detection;
pub mod error;
pub mod heuristic;
pub mod mapping;
pub mod preprocess;
pub mod primary;
pub mod template;
pub mod utils;

// Re-export commonly used types
pub use bbox::{AxisAlignedBox, BoardSpace, CoordinateSpace, ImageSpace, ModelSpace, Space};
pub use calibration::Calibration;
pub use detection::{
    CancellationToken, CascadeConfig, CascadeDetector, Detection, DetectionConfig, RawDetection,
    SourceMethod,
};
pub use error::CascadeError;
pub use heuristic::HeuristicMatcher;
pub use mapping::{BoardFrame, CoordinateMapper, LetterboxTransform};
pub use preprocess::{InputSpec, ModelInput, RegionPreprocessor};
pub use primary::{ArtifactManifest, ArtifactRegistry, DetectorArtifact, PrimaryDetector};
pub use template::{ReferenceLibrary, TemplateLoader, TemplateMatcher};
pub use utils::Deduplicator;

// Error handling for loading and IO paths
pub type Result<T> = anyhow::Result<T>;

/// Core traits for the CV system
pub mod traits {
    use super::*;
    use image::RgbImage;

    /// Uniform inference capability shared by every cascade tier.
    ///
    /// Boxes in the returned detections are relative to `image`; scores are
    /// raw and get mapped onto the shared confidence scale by the
    /// orchestrator's per-method [`Calibration`].
    pub trait Detector: Send + Sync {
        fn method(&self) -> SourceMethod;

        fn infer(&self, image: &RgbImage) -> std::result::Result<Vec<RawDetection>, CascadeError>;
    }
}
