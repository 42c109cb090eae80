//! Template matching over candidate regions using `imageproc`
//!
//! Every template is slid over the region; each template keeps its local
//! peaks above the threshold, then peaks from all templates compete so that
//! one location ends up with a single label.

use super::{PreprocessingMethod, ReferenceLibrary, TemplateConfig};
use crate::bbox::{AxisAlignedBox, ImageSpace};
use crate::detection::{RawDetection, SourceMethod};
use crate::error::CascadeError;
use crate::traits::Detector;
use crate::utils::ImageUtils;
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use imageproc::template_matching::match_template;
use std::sync::Arc;

type IntegralImage = ImageBuffer<Luma<u64>, Vec<u64>>;

/// One placement of one template inside a region
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    template_index: usize,
    score: f64,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Placement {
    fn bounds(&self) -> AxisAlignedBox<ImageSpace> {
        AxisAlignedBox::from_xywh(self.x as f64, self.y as f64, self.width as f64, self.height as f64)
    }
}

/// Preprocessed template with the statistics zero-mean correlation needs
struct PreparedTemplate {
    image: GrayImage,
    sum: f64,
    /// Sum of squared deviations from the mean; zero for a flat template
    energy: f64,
}

impl PreparedTemplate {
    fn new(image: GrayImage) -> Self {
        let (sum, sum_sq) = image
            .pixels()
            .fold((0u64, 0u64), |(s, sq), p| (s + p[0] as u64, sq + (p[0] as u64).pow(2)));
        let n = image.width() as u64 * image.height() as u64;
        Self {
            energy: energy(n, sum, sum_sq),
            sum: sum as f64,
            image,
        }
    }

    /// Zero-mean normalized correlation at `(x, y)` from the raw cross
    /// correlation there; `None` when either side is flat
    fn coefficient(&self, windows: &WindowSums, x: u32, y: u32, cross: f64) -> Option<f64> {
        let (width, height) = self.image.dimensions();
        let n = width as u64 * height as u64;
        let (window_sum, window_sq) = windows.window(x, y, width, height);
        let window_energy = energy(n, window_sum, window_sq);
        if window_energy <= 0.0 || self.energy <= 0.0 {
            return None;
        }
        let centered = cross - self.sum * window_sum as f64 / n as f64;
        Some(centered / (window_energy * self.energy).sqrt())
    }
}

/// `sum((v - mean)^2)` from `n`, `sum(v)` and `sum(v^2)`, exact up to the final division
fn energy(n: u64, sum: u64, sum_sq: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let scaled = (n as u128 * sum_sq as u128).saturating_sub(sum as u128 * sum as u128);
    scaled as f64 / n as f64
}

/// Integral images of a region for constant-time window sums
struct WindowSums {
    sum: IntegralImage,
    sum_sq: IntegralImage,
}

impl WindowSums {
    fn new(region: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(region),
            sum_sq: integral_squared_image::<_, u64>(region),
        }
    }

    fn window(&self, x: u32, y: u32, width: u32, height: u32) -> (u64, u64) {
        let (right, bottom) = (x + width - 1, y + height - 1);
        (
            sum_image_pixels(&self.sum, x, y, right, bottom)[0],
            sum_image_pixels(&self.sum_sq, x, y, right, bottom)[0],
        )
    }
}

/// Stateless matcher over a shared reference library.
///
/// Reference templates are preprocessed once at construction; each call
/// only preprocesses the region.
pub struct TemplateMatcher {
    library: Arc<ReferenceLibrary>,
    config: TemplateConfig,
    prepared: Vec<PreparedTemplate>,
}

impl TemplateMatcher {
    pub fn new(library: Arc<ReferenceLibrary>, config: TemplateConfig) -> Self {
        let prepared = library
            .templates()
            .iter()
            .map(|template| PreparedTemplate::new(preprocess(&template.image, &config)))
            .collect();
        Self {
            library,
            config,
            prepared,
        }
    }

    pub fn library(&self) -> &Arc<ReferenceLibrary> {
        &self.library
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Every non-overlapping placement above the raw threshold, best first.
    ///
    /// Each location carries the best-scoring reference; returned boxes are
    /// relative to `region`.
    pub fn match_region(&self, region: &GrayImage) -> Vec<RawDetection> {
        let processed = preprocess(region, &self.config);
        let windows = self.config.matching_method.is_zero_mean().then(|| WindowSums::new(&processed));
        let indices: Vec<usize> = (0..self.prepared.len()).collect();

        #[cfg(feature = "parallel")]
        let peaks: Vec<Vec<Placement>> = {
            use rayon::prelude::*;
            indices
                .par_iter()
                .map(|&index| self.peaks(&processed, windows.as_ref(), index))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let peaks: Vec<Vec<Placement>> = indices
            .iter()
            .map(|&index| self.peaks(&processed, windows.as_ref(), index))
            .collect();

        let placements = suppress(peaks.into_iter().flatten().collect(), &self.config);
        if placements.is_empty() {
            tracing::trace!("no template above {:.2} in region", self.config.threshold);
        }

        placements
            .into_iter()
            .map(|placement| {
                RawDetection::new(
                    placement.bounds(),
                    self.library.templates()[placement.template_index].label.clone(),
                    placement.score,
                )
            })
            .collect()
    }

    /// Slide one prepared template over the region and keep its peaks
    fn peaks(&self, region: &GrayImage, windows: Option<&WindowSums>, template_index: usize) -> Vec<Placement> {
        let template = &self.prepared[template_index];
        let (width, height) = template.image.dimensions();
        if width > region.width() || height > region.height() {
            return Vec::new();
        }
        if windows.is_some() && template.energy <= 0.0 {
            return Vec::new();
        }

        let result = match_template(region, &template.image, self.config.matching_method.to_imageproc());
        let inverted = self.config.matching_method.is_inverted();

        let candidates = result
            .enumerate_pixels()
            .filter_map(|(x, y, value)| {
                let value = value[0] as f64;
                let value = match windows {
                    Some(windows) => template.coefficient(windows, x, y, value)?,
                    None => value,
                };
                // Windows over flat areas normalize by zero and come out NaN
                if !value.is_finite() {
                    return None;
                }
                let score = (if inverted { 1.0 - value } else { value }).clamp(0.0, 1.0);
                (score >= self.config.threshold).then_some(Placement {
                    template_index,
                    score,
                    x,
                    y,
                    width,
                    height,
                })
            })
            .collect();

        suppress(candidates, &self.config)
    }
}

/// Greedy suppression: best score first, ties to the earliest template and
/// then reading order, so the outcome never depends on scheduling
fn suppress(mut placements: Vec<Placement>, config: &TemplateConfig) -> Vec<Placement> {
    placements.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.template_index.cmp(&b.template_index))
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });

    let mut kept: Vec<Placement> = Vec::new();
    for placement in placements {
        if kept.len() >= config.max_matches {
            break;
        }
        let bounds = placement.bounds();
        if kept
            .iter()
            .all(|accepted| !accepted.bounds().overlaps(&bounds, config.peak_overlap))
        {
            kept.push(placement);
        }
    }
    kept
}

impl Detector for TemplateMatcher {
    fn method(&self) -> SourceMethod {
        SourceMethod::Template
    }

    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, CascadeError> {
        ImageUtils::validate_dimensions(image.width(), image.height())?;
        Ok(self.match_region(&ImageUtils::to_gray(image)))
    }
}

/// Apply the configured preprocessing to a grayscale image
fn preprocess(image: &GrayImage, config: &TemplateConfig) -> GrayImage {
    match config.preprocessing {
        PreprocessingMethod::None => image.clone(),
        PreprocessingMethod::HistogramEqualization => imageproc::contrast::equalize_histogram(image),
        PreprocessingMethod::SobelMagnitude => sobel_magnitude(image),
        PreprocessingMethod::Canny => imageproc::edges::canny(
            image,
            config.preprocessing_params.canny_low,
            config.preprocessing_params.canny_high,
        ),
    }
}

/// Sobel gradient magnitude, saturated to 8 bits
fn sobel_magnitude(image: &GrayImage) -> GrayImage {
    let gradients = imageproc::gradients::sobel_gradients(image);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([gradients.get_pixel(x, y)[0].min(u8::MAX as u16) as u8])
    })
}
