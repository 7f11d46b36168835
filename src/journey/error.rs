use super::state::{BlockReason, Step};
use crate::blocker::BlockerKind;
use std::fmt;

/// Why an attempt ended without tariffs.
#[derive(Debug, thiserror::Error)]
pub enum JourneyError {
    #[error("blocked: {0}")]
    Blocked(BlockerKind),

    #[error("timed out waiting for {step} step")]
    Timeout { step: Step },

    #[error("no eligible address after {tried} candidates")]
    Exhausted { tried: usize },

    #[error("{0}")]
    Extraction(String),

    #[error("browser error: {0}")]
    Driver(#[from] scout_browser::Error),
}

/// Coarse failure classes for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Session-scoped blocker or broken browser; a fresh session may pass.
    TransientBlock,
    NavigationTimeout,
    ExtractionFailure,
    CandidatesExhausted,
}

impl JourneyError {
    pub fn kind(&self) -> FailureKind {
        match self {
            JourneyError::Blocked(_) | JourneyError::Driver(_) => FailureKind::TransientBlock,
            JourneyError::Timeout { .. } => FailureKind::NavigationTimeout,
            JourneyError::Extraction(_) => FailureKind::ExtractionFailure,
            JourneyError::Exhausted { .. } => FailureKind::CandidatesExhausted,
        }
    }
}

impl From<BlockReason> for JourneyError {
    fn from(reason: BlockReason) -> Self {
        match reason {
            BlockReason::Blocker(kind) => JourneyError::Blocked(kind),
            BlockReason::Timeout(step) => JourneyError::Timeout { step },
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::TransientBlock => "transient block",
            FailureKind::NavigationTimeout => "navigation timeout",
            FailureKind::ExtractionFailure => "extraction failure",
            FailureKind::CandidatesExhausted => "candidates exhausted",
        };
        f.write_str(s)
    }
}
