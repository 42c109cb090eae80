//! Reference library loading
//!
//! A reference directory holds one image per label (`KS.png`,
//! `joker_sun.png`, ...) and optionally sprite sheets named
//! `COLSxROWS Description.png` that get split into cells.

use super::{ReferenceLibrary, TemplateConfig};
use crate::Result;
use crate::utils::ImageUtils;
use anyhow::{Context, bail};
use cardscan_core::CardLabel;
use cardscan_core::cards::PLAYING_CARD_SHEET_LEN;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Grid layout parsed from a sprite sheet file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub columns: u32,
    pub rows: u32,
    pub description: String,
}

impl SheetLayout {
    /// Parse `"13x4 Playing Cards"` (a file stem) into a layout
    pub fn parse(stem: &str) -> Option<Self> {
        let (grid, description) = stem.split_once(' ')?;
        let (columns, rows) = grid.split_once(['x', 'X'])?;
        let columns: u32 = columns.parse().ok()?;
        let rows: u32 = rows.parse().ok()?;
        let description = description.trim();
        if columns == 0 || rows == 0 || description.is_empty() {
            return None;
        }
        Some(Self {
            columns,
            rows,
            description: description.to_string(),
        })
    }

    pub fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Label of the cell at `index` (row-major)
    pub fn cell_label(&self, index: usize) -> Result<String> {
        let description = self.description.to_lowercase();
        if self.cell_count() == PLAYING_CARD_SHEET_LEN && !description.contains("joker") {
            return Ok(CardLabel::from_sheet_index(index)?.to_string());
        }
        if description.contains("joker") {
            return Ok(format!("joker_{}", index));
        }
        Ok(format!("{}_{}", description.replace(' ', "_"), index))
    }

    /// Cut `sheet` into `(label, cell)` pairs
    pub fn split(&self, sheet: &RgbImage) -> Result<Vec<(String, RgbImage)>> {
        let cell_width = sheet.width() / self.columns;
        let cell_height = sheet.height() / self.rows;
        if cell_width == 0 || cell_height == 0 {
            bail!(
                "sprite sheet {}x{} too small for a {}x{} grid",
                sheet.width(),
                sheet.height(),
                self.columns,
                self.rows
            );
        }

        let mut cells = Vec::with_capacity(self.cell_count());
        for row in 0..self.rows {
            for col in 0..self.columns {
                let index = row as usize * self.columns as usize + col as usize;
                let cell = ImageUtils::crop(
                    sheet,
                    (col * cell_width, row * cell_height, cell_width, cell_height),
                );
                cells.push((self.cell_label(index)?, cell));
            }
        }
        Ok(cells)
    }
}

/// Reference library loader over one or more directories
pub struct TemplateLoader {
    template_dirs: Vec<PathBuf>,
    supported_extensions: Vec<String>,
}

impl TemplateLoader {
    pub fn new() -> Self {
        Self {
            template_dirs: Vec::new(),
            supported_extensions: vec![
                "png".to_string(),
                "jpg".to_string(),
                "jpeg".to_string(),
                "bmp".to_string(),
            ],
        }
    }

    /// Add template directory
    pub fn add_template_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.template_dirs.push(dir.as_ref().to_path_buf());
        self
    }

    /// Add supported extension
    pub fn add_extension(mut self, ext: impl Into<String>) -> Self {
        self.supported_extensions.push(ext.into().to_lowercase());
        self
    }

    /// Load every reference image and sprite sheet from the configured
    /// directories and pre-render their variants.
    pub fn load_library(&self, config: &TemplateConfig) -> Result<ReferenceLibrary> {
        let mut library = ReferenceLibrary::new();

        for path in self.image_files()? {
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let image = ImageUtils::load_rgb(&path)
                .with_context(|| format!("Failed to load reference: {:?}", path))?;

            match SheetLayout::parse(&stem) {
                Some(layout) => {
                    let cells = layout
                        .split(&image)
                        .with_context(|| format!("Failed to split sprite sheet: {:?}", path))?;
                    tracing::debug!("split {:?} into {} cells", path, cells.len());
                    for (label, cell) in cells {
                        library.add_reference(label, cell, config);
                    }
                }
                None => library.add_reference(stem, image, config),
            }
        }

        tracing::info!(
            "loaded {} labels ({} templates) from {} directories",
            library.references().len(),
            library.len(),
            self.template_dirs.len()
        );
        Ok(library)
    }

    /// Supported image files, sorted so loading order is reproducible
    fn image_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for dir in &self.template_dirs {
            if !dir.exists() {
                tracing::warn!("reference directory {:?} does not exist", dir);
                continue;
            }

            let entries = fs::read_dir(dir)
                .with_context(|| format!("Failed to read directory: {:?}", dir))?;

            for entry in entries {
                let path = entry?.path();
                if !path.is_file() {
                    continue;
                }
                if let Some(extension) = path.extension() {
                    let ext = extension.to_string_lossy().to_lowercase();
                    if self.supported_extensions.contains(&ext) {
                        files.push(path);
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

impl Default for TemplateLoader {
    fn default() -> Self {
        Self::new()
    }
}
