//! Coarse RGB color histograms

use image::RgbImage;

/// Bins per channel; 4 keeps the signature tolerant to lighting shifts
pub const BINS_PER_CHANNEL: usize = 4;
const BIN_WIDTH: usize = 256 / BINS_PER_CHANNEL;

/// Normalized joint RGB histogram (bins sum to 1, or all zero when empty)
#[derive(Debug, Clone, PartialEq)]
pub struct ColorHistogram {
    bins: Vec<f64>,
}

impl ColorHistogram {
    pub fn empty() -> Self {
        Self {
            bins: vec![0.0; BINS_PER_CHANNEL.pow(3)],
        }
    }

    pub fn from_image(image: &RgbImage) -> Self {
        let mut histogram = Self::empty();
        for pixel in image.pixels() {
            let [r, g, b] = pixel.0;
            histogram.bins[Self::bin_index(r, g, b)] += 1.0;
        }
        histogram.normalize();
        histogram
    }

    /// Mean of several histograms, e.g. all references of one label
    pub fn average<'a>(histograms: impl IntoIterator<Item = &'a ColorHistogram>) -> Self {
        let mut sum = Self::empty();
        let mut count = 0usize;
        for histogram in histograms {
            for (acc, value) in sum.bins.iter_mut().zip(&histogram.bins) {
                *acc += value;
            }
            count += 1;
        }
        if count > 0 {
            sum.bins.iter_mut().for_each(|b| *b /= count as f64);
        }
        sum
    }

    fn bin_index(r: u8, g: u8, b: u8) -> usize {
        let q = |c: u8| c as usize / BIN_WIDTH;
        (q(r) * BINS_PER_CHANNEL + q(g)) * BINS_PER_CHANNEL + q(b)
    }

    fn normalize(&mut self) {
        let total: f64 = self.bins.iter().sum();
        if total > 0.0 {
            self.bins.iter_mut().for_each(|b| *b /= total);
        }
    }

    /// Histogram intersection in `[0, 1]`
    pub fn intersection(&self, other: &ColorHistogram) -> f64 {
        self.bins
            .iter()
            .zip(&other.bins)
            .map(|(a, b)| a.min(*b))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    pub fn bins(&self) -> &[f64] {
        &self.bins
    }
}
