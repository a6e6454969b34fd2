//! Error types for deck loading, playback and transitions

use std::fmt;

use thiserror::Error;

use crate::types::DeckId;

/// Failure to bring a track into a playback chain
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Track source unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to decode track: {0}")]
    Decode(String),

    #[error("Timed out after {timeout_ms}ms waiting for track metadata")]
    Timeout { timeout_ms: u64 },

    #[error("Unsupported track source: {0}")]
    Unsupported(String),
}

impl LoadError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, LoadError::Unreachable(_) | LoadError::Timeout { .. })
    }
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Failure to start playback on a chain
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayError {
    #[error("Audio engine failed to start: {0}")]
    EngineStart(String),

    #[error("Audio output not permitted: {0}")]
    PermissionDenied(String),

    #[error("Deck {0} has no track loaded")]
    NothingLoaded(DeckId),
}

pub type PlayResult<T> = Result<T, PlayError>;

/// Why a scheduled or running transition was cancelled
///
/// Not an error: cancelling is a normal control path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAbort {
    /// A manual selection replaced the planned target
    Superseded,
    /// Auto-DJ was switched off
    Disabled,
    /// The crossfader was moved by hand mid-ramp
    ManualOverride,
    /// The incoming deck could not start
    IncomingFailed,
    Shutdown,
}

impl fmt::Display for TransitionAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TransitionAbort::Superseded => "superseded by manual selection",
            TransitionAbort::Disabled => "auto-dj disabled",
            TransitionAbort::ManualOverride => "manual crossfader override",
            TransitionAbort::IncomingFailed => "incoming deck failed to start",
            TransitionAbort::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

/// Errors surfaced by the orchestrator handle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("No track available for this request")]
    NoTarget,

    #[error("Auto-DJ service has stopped")]
    Stopped,

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Play(#[from] PlayError),
}
