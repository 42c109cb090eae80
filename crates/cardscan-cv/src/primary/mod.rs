//! Primary learned detector tier
//!
//! The trained artifact is owned by an external training pipeline and is
//! consumed here as a black box behind [`DetectorArtifact`].

pub mod adapter;
pub mod registry;

pub use adapter::PrimaryDetector;
pub use registry::ArtifactRegistry;

use crate::Result;
use crate::bbox::{AxisAlignedBox, ModelSpace};
use crate::error::CascadeError;
use crate::preprocess::{InputSpec, ModelInput};
use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One box emitted by an artifact, normalized to the model input
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactOutput {
    pub region: AxisAlignedBox<ModelSpace>,
    pub class_index: usize,
    /// Class probability as produced by the model
    pub score: f64,
}

/// Opaque trained-model handle.
///
/// Implementations are read-only after loading and must tolerate
/// concurrent `infer` calls.
pub trait DetectorArtifact: Send + Sync {
    fn name(&self) -> &str;

    /// Resolution and normalization the model was trained with
    fn input_spec(&self) -> &InputSpec;

    /// Class labels indexed by [`ArtifactOutput::class_index`]
    fn labels(&self) -> &[String];

    fn infer(&self, input: &ModelInput) -> std::result::Result<Vec<ArtifactOutput>, CascadeError>;
}

/// JSON sidecar shipped with an artifact by the training pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub name: String,
    #[serde(default)]
    pub input: InputSpec,
    pub labels: Vec<String>,
}

impl ArtifactManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact manifest: {:?}", path))?;
        let manifest: ArtifactManifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact manifest: {:?}", path))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.labels.is_empty(), "artifact '{}' declares no labels", self.name);
        self.input
            .validate()
            .map_err(|msg| anyhow::anyhow!("artifact '{}': {}", self.name, msg))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_manifest_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name": "cards-v3", "input": {{"width": 320, "height": 320}}, "labels": ["KS", "joker_sun"]}}"#
        )
        .unwrap();

        let manifest = ArtifactManifest::load(file.path()).unwrap();
        assert_eq!(manifest.name, "cards-v3");
        assert_eq!(manifest.input.width, 320);
        assert_eq!(manifest.input.pad_color, [114, 114, 114]);
        assert_eq!(manifest.labels.len(), 2);
    }

    #[test]
    fn test_manifest_without_labels_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "empty", "labels": []}}"#).unwrap();
        assert!(ArtifactManifest::load(file.path()).is_err());
    }
}
