//! Contour-based matcher that needs no trained artifact

use super::{ColorHistogram, HeuristicConfig};
use crate::bbox::AxisAlignedBox;
use crate::detection::{RawDetection, SourceMethod};
use crate::error::CascadeError;
use crate::template::ReferenceLibrary;
use crate::traits::Detector;
use crate::utils::ImageUtils;
use image::{GrayImage, RgbImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use std::collections::BTreeMap;

/// Finds card-shaped blobs and classifies them by color signature
pub struct HeuristicMatcher {
    config: HeuristicConfig,
    signatures: BTreeMap<String, ColorHistogram>,
}

impl HeuristicMatcher {
    /// One averaged color signature per library label
    pub fn new(library: &ReferenceLibrary, config: HeuristicConfig) -> Self {
        let signatures = library
            .references()
            .iter()
            .map(|(label, images)| {
                let histograms: Vec<_> = images.iter().map(ColorHistogram::from_image).collect();
                (label.clone(), ColorHistogram::average(&histograms))
            })
            .collect();
        Self { config, signatures }
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Card-shaped candidate rectangles `(x, y, width, height)` in `region`
    pub fn candidate_rects(&self, region: &GrayImage) -> Vec<(u32, u32, u32, u32)> {
        let edges = imageproc::edges::canny(region, self.config.canny_low, self.config.canny_high);
        let edges = if self.config.dilate_radius > 0 {
            imageproc::morphology::dilate(&edges, Norm::LInf, self.config.dilate_radius)
        } else {
            edges
        };

        let (low, high) = self.config.aspect_range;
        find_contours::<i32>(&edges)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter_map(|contour| {
                let xs = contour.points.iter().map(|p| p.x);
                let ys = contour.points.iter().map(|p| p.y);
                let (x_min, x_max) = (xs.clone().min()?, xs.max()?);
                let (y_min, y_max) = (ys.clone().min()?, ys.max()?);
                Some((
                    x_min as u32,
                    y_min as u32,
                    (x_max - x_min + 1) as u32,
                    (y_max - y_min + 1) as u32,
                ))
            })
            .filter(|&(_, _, w, h)| {
                let aspect = w as f64 / h as f64;
                w * h >= self.config.min_area && (low..=high).contains(&aspect)
            })
            .collect()
    }

    /// Label and raw score for one candidate crop
    pub fn classify(&self, crop: &RgbImage) -> Option<(String, f64)> {
        let histogram = ColorHistogram::from_image(crop);
        let aspect = crop.width() as f64 / crop.height() as f64;
        let target = self.config.target_aspect;
        let aspect_agreement = 1.0 - ((aspect - target).abs() / target).min(1.0);

        let mut best: Option<(&str, f64)> = None;
        for (label, signature) in &self.signatures {
            let similarity = histogram.intersection(signature);
            // Strict comparison keeps the first label on ties
            if best.is_none_or(|(_, score)| similarity > score) {
                best = Some((label.as_str(), similarity));
            }
        }

        best.map(|(label, similarity)| (label.to_string(), similarity * aspect_agreement))
    }

    /// Detect card-shaped elements in `region`; boxes relative to `region`
    pub fn match_region(&self, region: &RgbImage) -> Vec<RawDetection> {
        if self.signatures.is_empty() {
            return Vec::new();
        }

        let rects = self.candidate_rects(&ImageUtils::to_gray(region));
        let mut found = Vec::new();
        for rect in rects {
            let crop = ImageUtils::crop(region, rect);
            match self.classify(&crop) {
                Some((label, score)) if score >= self.config.min_score => {
                    let (x, y, w, h) = rect;
                    found.push(RawDetection::new(
                        AxisAlignedBox::from_xywh(x as f64, y as f64, w as f64, h as f64),
                        label,
                        score,
                    ));
                }
                Some((label, score)) => {
                    tracing::trace!("heuristic {} at {:?} scored {:.3}, dropped", label, rect, score)
                }
                None => {}
            }
        }
        found
    }
}

impl Detector for HeuristicMatcher {
    fn method(&self) -> SourceMethod {
        SourceMethod::Heuristic
    }

    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, CascadeError> {
        ImageUtils::validate_dimensions(image.width(), image.height())?;
        Ok(self.match_region(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateConfig;
    use image::Rgb;

    const YELLOW: Rgb<u8> = Rgb([255, 220, 40]);
    const BLUE: Rgb<u8> = Rgb([60, 140, 255]);

    fn library() -> ReferenceLibrary {
        ReferenceLibrary::from_references(
            [
                ("joker_sun", RgbImage::from_pixel(20, 28, YELLOW)),
                ("icon_blue", RgbImage::from_pixel(20, 28, BLUE)),
            ],
            &TemplateConfig::default(),
        )
    }

    fn scene(color: Rgb<u8>) -> RgbImage {
        let mut image = RgbImage::new(160, 120);
        for x in 60..90 {
            for y in 40..82 {
                image.put_pixel(x, y, color);
            }
        }
        image
    }

    fn matcher() -> HeuristicMatcher {
        let config = HeuristicConfig {
            min_area: 200,
            ..Default::default()
        };
        HeuristicMatcher::new(&library(), config)
    }

    #[test]
    fn test_finds_card_shaped_blob() {
        let found = matcher().infer(&scene(YELLOW)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_label, "joker_sun");
        assert!(found[0].score > 0.6);

        let center = found[0].region.center();
        assert!((center.0 - 75.0).abs() < 3.0);
        assert!((center.1 - 61.0).abs() < 3.0);
    }

    #[test]
    fn test_color_decides_label() {
        let found = matcher().infer(&scene(BLUE)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_label, "icon_blue");
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let mut image = RgbImage::new(160, 120);
        for x in 10..150 {
            for y in 50..60 {
                image.put_pixel(x, y, YELLOW);
            }
        }
        assert!(matcher().infer(&image).unwrap().is_empty());
    }

    #[test]
    fn test_blank_region_yields_nothing() {
        assert!(matcher().infer(&RgbImage::new(64, 64)).unwrap().is_empty());
    }
}
