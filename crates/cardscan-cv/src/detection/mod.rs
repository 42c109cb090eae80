//! Detection cascade: records, configuration and the orchestrator

pub mod cancel;
pub mod config;
pub mod detector;
pub mod record;
pub mod stage;
pub mod state;

pub use cancel::CancellationToken;
pub use config::{CascadeConfig, DegradedGridConfig, DetectionConfig};
pub use detector::{CascadeDetector, CascadeOutcome, CascadeStats};
pub use record::{Detection, RawDetection, SourceMethod};
pub use stage::{CandidateRegion, RegionOrigin};
pub use state::{EscalationState, TierOutcome};
