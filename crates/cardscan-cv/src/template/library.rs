//! In-memory reference library
//!
//! Holds every reference image per class label together with its
//! pre-rendered grayscale variants. Built once at startup and shared
//! read-only between the template and heuristic tiers.

use super::{Template, TemplateConfig, TemplateVariant};
use crate::utils::ImageUtils;
use image::{GrayImage, Luma, RgbImage, imageops};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use std::collections::BTreeMap;

/// Variants smaller than this on either side are not worth matching
const MIN_TEMPLATE_SIDE: u32 = 4;

#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    templates: Vec<Template>,
    references: BTreeMap<String, Vec<RgbImage>>,
}

impl ReferenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a library from `(label, image)` pairs
    pub fn from_references<I, L>(references: I, config: &TemplateConfig) -> Self
    where
        I: IntoIterator<Item = (L, RgbImage)>,
        L: Into<String>,
    {
        let mut library = Self::new();
        for (label, image) in references {
            library.add_reference(label, image, config);
        }
        library
    }

    /// Add a reference image and pre-render its variants
    pub fn add_reference(&mut self, label: impl Into<String>, image: RgbImage, config: &TemplateConfig) {
        let label = label.into();
        let gray = ImageUtils::to_gray(&image);

        for variant in config.variants() {
            match Self::render_variant(&gray, variant) {
                Some(rendered) => self.templates.push(Template::new(label.clone(), variant, rendered)),
                None => tracing::debug!(
                    "skipping {} variant {:?}: smaller than {}px",
                    label,
                    variant,
                    MIN_TEMPLATE_SIDE
                ),
            }
        }

        self.references.entry(label).or_default().push(image);
    }

    fn render_variant(gray: &GrayImage, variant: TemplateVariant) -> Option<GrayImage> {
        let (width, height) = gray.dimensions();
        let new_width = (width as f64 * variant.scale).round() as u32;
        let new_height = (height as f64 * variant.scale).round() as u32;
        if new_width < MIN_TEMPLATE_SIDE || new_height < MIN_TEMPLATE_SIDE {
            return None;
        }

        let scaled = if (new_width, new_height) == (width, height) {
            gray.clone()
        } else {
            imageops::resize(gray, new_width, new_height, imageops::FilterType::Triangle)
        };

        if variant.rotation_deg.abs() < f64::EPSILON {
            return Some(scaled);
        }

        // Corners uncovered by the rotation take the white card background
        Some(rotate_about_center(
            &scaled,
            variant.rotation_deg.to_radians() as f32,
            Interpolation::Bilinear,
            Luma([255u8]),
        ))
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Original color references, by label
    pub fn references(&self) -> &BTreeMap<String, Vec<RgbImage>> {
        &self.references
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.references.keys().map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.references.contains_key(label)
    }

    /// Number of pre-rendered templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
