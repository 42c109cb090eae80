//! Running one tier on one image, optionally under a deadline

use super::RawDetection;
use crate::bbox::{AxisAlignedBox, ImageSpace};
use crate::error::CascadeError;
use crate::traits::Detector;
use crossbeam_channel::RecvTimeoutError;
use image::RgbImage;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Why a region is being escalated past the primary tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOrigin {
    /// Primary confidence between the escalation and acceptance thresholds
    Ambiguous,
    /// Primary confidence below the escalation threshold
    Recovery,
    /// Grid cell scanned because the primary tier failed
    DegradedGrid,
}

/// Sub-rectangle of the capture awaiting the fallback tiers
#[derive(Debug, Clone)]
pub struct CandidateRegion {
    /// Position in the source image; detections are translated by its origin
    pub bounds: AxisAlignedBox<ImageSpace>,
    pub origin: RegionOrigin,
    pub image: Arc<RgbImage>,
}

impl CandidateRegion {
    /// Crop `bounds` (clipped to the image) out of `source`
    pub fn crop(source: &RgbImage, bounds: &AxisAlignedBox<ImageSpace>, origin: RegionOrigin) -> Option<Self> {
        let (x, y, w, h) = bounds.pixel_rect(source.width(), source.height())?;
        let image = image::imageops::crop_imm(source, x, y, w, h).to_image();
        Some(Self {
            bounds: AxisAlignedBox::from_xywh(x as f64, y as f64, w as f64, h as f64),
            origin,
            image: Arc::new(image),
        })
    }
}

/// Invoke `detector` on `image`.
///
/// With a timeout the call runs on a worker thread; if it misses the
/// deadline the result is abandoned and `InferenceTimeout` returned.
///
/// An abandoned worker is detached, not stopped: it runs until the detector
/// returns. For the primary tier it keeps the artifact read guard until
/// then, so `ArtifactRegistry::hot_swap` and `teardown` wait on a hung
/// artifact, and repeated hangs accumulate threads.
pub fn run_stage(
    detector: &Arc<dyn Detector>,
    image: &Arc<RgbImage>,
    timeout: Option<Duration>,
) -> Result<Vec<RawDetection>, CascadeError> {
    let Some(timeout) = timeout else {
        return detector.infer(image);
    };

    let method = detector.method();
    let worker_name = format!("cardscan-{}", method).to_lowercase();
    let (tx, rx) = crossbeam_channel::bounded(1);
    let worker_detector = Arc::clone(detector);
    let worker_image = Arc::clone(image);
    thread::Builder::new()
        .name(worker_name.clone())
        .spawn(move || {
            // The receiver may be gone after a timeout
            let _ = tx.send(worker_detector.infer(&worker_image));
        })
        .map_err(|e| CascadeError::Inference {
            method,
            message: format!("failed to spawn stage worker: {}", e),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(
                "abandoning worker thread {} after {}ms; it runs until {} returns",
                worker_name,
                timeout.as_millis(),
                method
            );
            Err(CascadeError::InferenceTimeout {
                method,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(CascadeError::Inference {
            method,
            message: "stage worker exited without a result".to_string(),
        }),
    }
}
