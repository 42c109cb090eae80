//! Per-region escalation state machine
//!
//! ```text
//! PendingPrimary -> PendingTemplate -> PendingHeuristic -> Unresolved
//!        \                 \                  \
//!         `--------------- Resolved <----------'
//! ```
//!
//! Transitions only move forward, so no tier runs twice on one region.

use super::{Detection, SourceMethod};
use crate::bbox::ImageSpace;

/// Result of running one tier on a region
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    /// Calibrated detections at or above the acceptance threshold
    Accepted(Vec<Detection<ImageSpace>>),
    /// Ran, found nothing acceptable
    Rejected,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EscalationState {
    PendingPrimary,
    PendingTemplate,
    PendingHeuristic,
    Resolved(Vec<Detection<ImageSpace>>),
    Unresolved,
}

impl EscalationState {
    /// Tier to consult next, `None` once terminal
    pub fn pending_method(&self) -> Option<SourceMethod> {
        match self {
            EscalationState::PendingPrimary => Some(SourceMethod::Primary),
            EscalationState::PendingTemplate => Some(SourceMethod::Template),
            EscalationState::PendingHeuristic => Some(SourceMethod::Heuristic),
            EscalationState::Resolved(_) | EscalationState::Unresolved => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.pending_method().is_none()
    }

    /// Apply the outcome of the pending tier. Terminal states absorb.
    pub fn advance(self, outcome: TierOutcome) -> Self {
        if self.is_terminal() {
            return self;
        }
        match outcome {
            TierOutcome::Accepted(detections) if !detections.is_empty() => {
                EscalationState::Resolved(detections)
            }
            _ => self.escalate(),
        }
    }

    fn escalate(self) -> Self {
        match self {
            EscalationState::PendingPrimary => EscalationState::PendingTemplate,
            EscalationState::PendingTemplate => EscalationState::PendingHeuristic,
            EscalationState::PendingHeuristic => EscalationState::Unresolved,
            terminal => terminal,
        }
    }

    /// Accepted detections, empty unless resolved
    pub fn into_detections(self) -> Vec<Detection<ImageSpace>> {
        match self {
            EscalationState::Resolved(detections) => detections,
            _ => Vec::new(),
        }
    }
}
