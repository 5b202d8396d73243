//! # Errors
//!
//! Every failure the engine can report. All of them are recoverable:
//! the action boundary converts them into a notification and the host
//! carries on.

use crate::engine::{ApplySummary, TargetFailure};
use crate::primitives::EntityId;
use thiserror::Error;

/// A die formula that is not of the form `NdM`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid die expression: {0:?}")]
pub struct DieParseError(pub String);

/// Failure of the attribute-store backend or of the value codec.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend refused or failed the operation.
    #[error("attribute backend: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("attribute codec: {0}")]
    Codec(#[from] postcard::Error),
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Failure reported by a host collaborator (indicators, dice, actors).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// How loudly a failure should be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Errors of the mark engine.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// Every mark slot is already in use.
    #[error("you already have {active}/{capacity} targets marked")]
    NoCapacity { active: usize, capacity: usize },

    /// The uses for this recovery period are spent.
    #[error("no uses remaining (used {used}/{max})")]
    NoUsesRemaining { used: u32, max: u32 },

    /// The candidate list was empty.
    #[error("target at least one token")]
    NoTargetsSelected,

    /// The target carries no mark from this caster.
    #[error("{target} carries no mark from {caster}")]
    NoActiveMark { caster: EntityId, target: EntityId },

    /// A persisted write did not complete.
    #[error("store write failed: {0}")]
    StoreWriteFailed(#[source] StoreError),

    /// A persisted read did not complete.
    #[error("store read failed: {0}")]
    StoreReadFailed(#[source] StoreError),

    /// Persisted mark state could not be interpreted.
    #[error("mark state on {target} is corrupt: {reason}")]
    CorruptState { target: EntityId, reason: String },

    /// A collaborator failed mid-action.
    #[error("host failure: {0}")]
    Host(#[from] HostError),

    /// Some targets of an apply batch were marked and some were not.
    #[error(
        "marked {} target(s), failed to mark {}",
        summary.marked.len(),
        failed.len()
    )]
    PartialApply {
        summary: Box<ApplySummary>,
        failed: Vec<TargetFailure>,
    },

    /// The user closed the prompt before choosing.
    #[error("action cancelled")]
    Cancelled,
}

impl QuarryError {
    /// Guard failures are warnings; everything else is an error.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoCapacity { .. }
            | Self::NoUsesRemaining { .. }
            | Self::NoTargetsSelected
            | Self::NoActiveMark { .. }
            | Self::Cancelled => Severity::Warning,
            Self::StoreWriteFailed(_)
            | Self::StoreReadFailed(_)
            | Self::CorruptState { .. }
            | Self::Host(_)
            | Self::PartialApply { .. } => Severity::Error,
        }
    }

    /// True when nothing was mutated because a precondition failed.
    #[must_use]
    pub fn is_guard_failure(&self) -> bool {
        self.severity() == Severity::Warning
    }
}

/// Result alias for engine operations.
pub type QuarryResult<T> = Result<T, QuarryError>;

// =============================================================================
// TESTS
// =============================================================================
