//! Process-wide owner of the loaded detector artifact and reference library

use super::DetectorArtifact;
use crate::template::ReferenceLibrary;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

type ArtifactSlot = Option<Arc<dyn DetectorArtifact>>;

/// Artifact lifecycle: install, hot-swap, teardown.
///
/// Inference holds the read guard for the whole call, so a swap or teardown
/// waits until no inference is in flight.
pub struct ArtifactRegistry {
    artifact: RwLock<ArtifactSlot>,
    library: Arc<ReferenceLibrary>,
    generation: AtomicU64,
}

impl ArtifactRegistry {
    /// Registry with no artifact; the cascade runs degraded until one is installed
    pub fn new(library: Arc<ReferenceLibrary>) -> Self {
        Self {
            artifact: RwLock::new(None),
            library,
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_artifact(library: Arc<ReferenceLibrary>, artifact: Arc<dyn DetectorArtifact>) -> Self {
        let registry = Self::new(library);
        registry.install(artifact);
        registry
    }

    /// Install an artifact, returning the one it replaced
    pub fn install(&self, artifact: Arc<dyn DetectorArtifact>) -> ArtifactSlot {
        let mut slot = self.artifact.write();
        let previous = slot.replace(artifact);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            "installed detector artifact '{}' (generation {})",
            slot.as_ref().map(|a| a.name()).unwrap_or_default(),
            generation
        );
        previous
    }

    /// Replace the live artifact once in-flight inference has drained
    pub fn hot_swap(&self, artifact: Arc<dyn DetectorArtifact>) -> ArtifactSlot {
        self.install(artifact)
    }

    /// Drop the artifact; later requests run in degraded mode
    pub fn teardown(&self) -> ArtifactSlot {
        let previous = self.artifact.write().take();
        if let Some(artifact) = &previous {
            self.generation.fetch_add(1, Ordering::SeqCst);
            tracing::info!("tore down detector artifact '{}'", artifact.name());
        }
        previous
    }

    pub fn is_available(&self) -> bool {
        self.artifact.read().is_some()
    }

    /// Incremented on every install and teardown
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn library(&self) -> &Arc<ReferenceLibrary> {
        &self.library
    }

    pub(crate) fn read_artifact(&self) -> RwLockReadGuard<'_, ArtifactSlot> {
        self.artifact.read()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bbox::AxisAlignedBox;
    use crate::error::CascadeError;
    use crate::preprocess::{InputSpec, ModelInput};
    use crate::primary::ArtifactOutput;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    /// Artifact returning fixed normalized boxes, optionally slow
    pub(crate) struct FixedArtifact {
        pub name: String,
        pub spec: InputSpec,
        pub labels: Vec<String>,
        pub outputs: Vec<ArtifactOutput>,
        pub delay: Duration,
        pub running: Arc<AtomicBool>,
    }

    impl FixedArtifact {
        pub(crate) fn new(name: &str, outputs: Vec<ArtifactOutput>) -> Self {
            Self {
                name: name.to_string(),
                spec: InputSpec {
                    width: 64,
                    height: 64,
                    ..Default::default()
                },
                labels: vec!["KS".to_string(), "joker_sun".to_string()],
                outputs,
                delay: Duration::ZERO,
                running: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl DetectorArtifact for FixedArtifact {
        fn name(&self) -> &str {
            &self.name
        }

        fn input_spec(&self) -> &InputSpec {
            &self.spec
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn infer(&self, _input: &ModelInput) -> Result<Vec<ArtifactOutput>, CascadeError> {
            self.running.store(true, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.running.store(false, Ordering::SeqCst);
            Ok(self.outputs.clone())
        }
    }

    pub(crate) fn output(x0: f64, y0: f64, x1: f64, y1: f64, class_index: usize, score: f64) -> ArtifactOutput {
        ArtifactOutput {
            region: AxisAlignedBox::new(x0, y0, x1, y1),
            class_index,
            score,
        }
    }

    #[test]
    fn test_lifecycle() {
        let registry = ArtifactRegistry::new(Arc::new(ReferenceLibrary::new()));
        assert!(!registry.is_available());

        assert!(registry.install(Arc::new(FixedArtifact::new("v1", vec![]))).is_none());
        assert!(registry.is_available());

        let previous = registry.hot_swap(Arc::new(FixedArtifact::new("v2", vec![])));
        assert_eq!(previous.unwrap().name(), "v1");
        assert_eq!(registry.read_artifact().as_ref().unwrap().name(), "v2");

        assert_eq!(registry.teardown().unwrap().name(), "v2");
        assert!(!registry.is_available());
        assert_eq!(registry.generation(), 3);
    }

    #[test]
    fn test_swap_waits_for_inflight_inference() {
        let registry = Arc::new(ArtifactRegistry::new(Arc::new(ReferenceLibrary::new())));
        let mut slow = FixedArtifact::new("slow", vec![]);
        slow.delay = Duration::from_millis(150);
        let running = slow.running.clone();
        registry.install(Arc::new(slow));

        let reader = {
            let registry = registry.clone();
            thread::spawn(move || {
                let guard = registry.read_artifact();
                let input = crate::preprocess::RegionPreprocessor::new(InputSpec {
                    width: 8,
                    height: 8,
                    ..Default::default()
                })
                .prepare(&image::RgbImage::new(8, 8))
                .unwrap();
                guard.as_ref().unwrap().infer(&input).unwrap();
            })
        };

        while !running.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        let previous = registry.hot_swap(Arc::new(FixedArtifact::new("fast", vec![])));
        // The write guard is only granted after the slow call returned
        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(previous.unwrap().name(), "slow");
        reader.join().unwrap();
    }
}
