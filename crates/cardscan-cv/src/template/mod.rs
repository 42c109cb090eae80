//! Template matching module

pub mod library;
pub mod loader;
pub mod matcher;

pub use library::ReferenceLibrary;
pub use loader::TemplateLoader;
pub use matcher::TemplateMatcher;

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Pre-rendered scale/rotation variant of a reference image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariant {
    pub scale: f64,
    pub rotation_deg: f64,
}

impl Default for TemplateVariant {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation_deg: 0.0,
        }
    }
}

/// Template data structure
#[derive(Debug, Clone)]
pub struct Template {
    pub label: String,
    pub variant: TemplateVariant,
    pub image: GrayImage,
}

impl Template {
    pub fn new(label: impl Into<String>, variant: TemplateVariant, image: GrayImage) -> Self {
        Self {
            label: label.into(),
            variant,
            image,
        }
    }
}

/// Template matching method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchingMethod {
    /// Zero-mean normalized cross-correlation (higher is better).
    /// Flat templates and flat windows never match.
    CCoeffNormed,
    /// Normalized cross-correlation (higher is better)
    CCorrNormed,
    /// Normalized squared difference (inverted: lower is better)
    SqDiffNormed,
}

impl MatchingMethod {
    /// The `imageproc` method computing this score, or the raw cross
    /// correlation it is derived from
    pub fn to_imageproc(&self) -> imageproc::template_matching::MatchTemplateMethod {
        use imageproc::template_matching::MatchTemplateMethod;
        match self {
            MatchingMethod::CCoeffNormed => MatchTemplateMethod::CrossCorrelation,
            MatchingMethod::CCorrNormed => MatchTemplateMethod::CrossCorrelationNormalized,
            MatchingMethod::SqDiffNormed => MatchTemplateMethod::SumOfSquaredErrorsNormalized,
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!(self, MatchingMethod::SqDiffNormed)
    }

    pub fn is_zero_mean(&self) -> bool {
        matches!(self, MatchingMethod::CCoeffNormed)
    }
}

/// Preprocessing method for robust matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocessingMethod {
    /// No preprocessing
    None,
    /// Histogram equalization (normalize brightness)
    HistogramEqualization,
    /// Sobel gradient magnitude (edge-based)
    SobelMagnitude,
    /// Canny edges (binary edge matching)
    Canny,
}

/// Parameters for preprocessing methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingParams {
    /// Canny low threshold
    pub canny_low: f32,
    /// Canny high threshold
    pub canny_high: f32,
}

impl Default for PreprocessingParams {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

/// Template matching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Minimum raw score for a match to be reported at all
    pub threshold: f64,
    /// Scale variants pre-rendered for every reference
    pub scale_factors: Vec<f64>,
    /// Rotation variants (degrees) pre-rendered for every reference
    pub rotations_deg: Vec<f64>,
    pub matching_method: MatchingMethod,
    pub preprocessing: PreprocessingMethod,
    pub preprocessing_params: PreprocessingParams,
    /// Most placements reported for one region
    pub max_matches: usize,
    /// Placements overlapping a better one by more than this IoU are dropped,
    /// so each location keeps a single label
    pub peak_overlap: f64,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            scale_factors: vec![1.0],
            rotations_deg: vec![0.0],
            matching_method: MatchingMethod::CCoeffNormed,
            preprocessing: PreprocessingMethod::None,
            preprocessing_params: PreprocessingParams::default(),
            max_matches: 16,
            peak_overlap: 0.1,
        }
    }
}

impl TemplateConfig {
    /// Brightness-normalized matching for unevenly lit captures
    pub fn for_uneven_lighting() -> Self {
        Self {
            preprocessing: PreprocessingMethod::HistogramEqualization,
            ..Default::default()
        }
    }

    /// Configuration for edge-based matching
    pub fn edge_matching() -> Self {
        Self {
            preprocessing: PreprocessingMethod::SobelMagnitude,
            ..Default::default()
        }
    }

    /// Tolerates cards drawn slightly larger/smaller and tilted
    pub fn with_variants() -> Self {
        Self {
            scale_factors: vec![0.9, 1.0, 1.1],
            rotations_deg: vec![-5.0, 0.0, 5.0],
            ..Default::default()
        }
    }

    /// All (scale, rotation) combinations to pre-render
    pub fn variants(&self) -> Vec<TemplateVariant> {
        self.scale_factors
            .iter()
            .flat_map(|&scale| {
                self.rotations_deg
                    .iter()
                    .map(move |&rotation_deg| TemplateVariant {
                        scale,
                        rotation_deg,
                    })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("template threshold must be in [0, 1], got {}", self.threshold));
        }
        if self.scale_factors.is_empty() || self.rotations_deg.is_empty() {
            return Err("template config needs at least one scale and one rotation".to_string());
        }
        if let Some(scale) = self
            .scale_factors
            .iter()
            .find(|s| !s.is_finite() || **s <= 0.0)
        {
            return Err(format!("template scale factors must be positive, got {}", scale));
        }
        if self.rotations_deg.iter().any(|r| !r.is_finite()) {
            return Err("template rotations must be finite".to_string());
        }
        if self.max_matches == 0 {
            return Err("template max_matches must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.peak_overlap) {
            return Err(format!("template peak_overlap must be in [0, 1], got {}", self.peak_overlap));
        }
        if self.preprocessing_params.canny_low > self.preprocessing_params.canny_high {
            return Err(format!(
                "canny_low ({}) above canny_high ({})",
                self.preprocessing_params.canny_low, self.preprocessing_params.canny_high
            ));
        }
        Ok(())
    }
}
