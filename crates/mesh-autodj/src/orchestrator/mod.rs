//! Auto-DJ orchestration
//!
//! [`AutoDj::spawn`] starts the service task and returns an
//! [`AutoDjHandle`]. The service owns the engine, both decks, the
//! crossfader and the transition state; the handle is the only way in.
//!
//! One transition cycle:
//!
//! 1. At 50% of the active track the candidate pool is scored.
//! 2. At 75% (or 15s remaining) the chosen track is loaded on the idle deck
//!    and a plan is generated.
//! 3. The transition fires so that it ends with the outgoing track:
//!    `prepared_at + max(0, remaining - duration)`.
//! 4. When the ramp completes the outgoing deck stops and the decks swap
//!    roles.

mod messages;
mod monitor;
mod service;

pub use messages::{AutoDjEvent, EventBus, TransitionState};
pub use monitor::{MonitorAction, MonitorPhase, Progress, ProgressMonitor};
pub use service::{AutoDj, Collaborators};

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::AutoDjSettings;
use crate::deck::DeckState;
use crate::engine::{AudioEngine, MeterReading};
use crate::error::OrchestratorError;
use crate::scoring::ScoredCandidate;
use crate::track::Track;
use crate::types::DeckId;
use messages::AutoDjCommand;

/// Cloneable front end of the Auto-DJ service
#[derive(Clone)]
pub struct AutoDjHandle {
    commands: mpsc::UnboundedSender<AutoDjCommand>,
    events: EventBus,
    engine: Arc<AudioEngine>,
}

impl AutoDjHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> AutoDjCommand,
    ) -> Result<T, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| OrchestratorError::Stopped)?;
        rx.await.map_err(|_| OrchestratorError::Stopped)
    }

    /// Load `track` on `deck`, start it and make that deck the active one
    pub async fn play_track(&self, deck: DeckId, track: Track) -> Result<(), OrchestratorError> {
        self.request(|reply| AutoDjCommand::PlayTrack { deck, track, reply })
            .await?
    }

    /// Current pick for the next track (the locked one if any)
    pub async fn get_suggestion(&self) -> Result<Option<ScoredCandidate>, OrchestratorError> {
        self.request(|reply| AutoDjCommand::GetSuggestion { reply }).await
    }

    /// Pin the current suggestion so later rescoring cannot replace it
    pub async fn accept_suggestion(&self) -> Result<Option<ScoredCandidate>, OrchestratorError> {
        self.request(|reply| AutoDjCommand::AcceptSuggestion { reply }).await
    }

    /// Move on to the next-ranked candidate
    pub async fn skip_suggestion(&self) -> Result<Option<ScoredCandidate>, OrchestratorError> {
        self.request(|reply| AutoDjCommand::SkipSuggestion { reply }).await
    }

    /// Force `track` as the next track, bypassing the ranking
    pub async fn lock_candidate(&self, track: Track) -> Result<ScoredCandidate, OrchestratorError> {
        self.request(|reply| AutoDjCommand::LockCandidate { track, reply })
            .await?
    }

    pub async fn unlock_candidate(&self) -> Result<(), OrchestratorError> {
        self.request(|reply| AutoDjCommand::UnlockCandidate { reply }).await
    }

    /// Lock the best candidate within one level of `level`
    pub async fn request_track_at_energy(
        &self,
        level: u8,
    ) -> Result<ScoredCandidate, OrchestratorError> {
        self.request(|reply| AutoDjCommand::RequestTrackAtEnergy { level, reply })
            .await?
    }

    pub async fn get_transition_state(&self) -> Result<TransitionState, OrchestratorError> {
        self.request(|reply| AutoDjCommand::GetTransitionState { reply }).await
    }

    pub async fn get_deck_state(&self, deck: DeckId) -> Result<DeckState, OrchestratorError> {
        self.request(|reply| AutoDjCommand::GetDeckState { deck, reply }).await
    }

    pub async fn active_deck(&self) -> Result<DeckId, OrchestratorError> {
        self.request(|reply| AutoDjCommand::GetActiveDeck { reply }).await
    }

    pub async fn seek(&self, deck: DeckId, seconds: f64) -> Result<(), OrchestratorError> {
        self.request(|reply| AutoDjCommand::Seek {
            deck,
            seconds,
            reply,
        })
        .await
    }

    /// Manual crossfader move; cancels a running transition
    pub async fn set_crossfader_position(&self, position: f32) -> Result<(), OrchestratorError> {
        self.request(|reply| AutoDjCommand::SetCrossfaderPosition { position, reply })
            .await
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), OrchestratorError> {
        self.request(|reply| AutoDjCommand::SetEnabled { enabled, reply }).await
    }

    /// Replace the preferences and persist them through the settings store
    pub async fn update_settings(&self, settings: AutoDjSettings) -> Result<(), OrchestratorError> {
        self.request(|reply| AutoDjCommand::UpdateSettings { settings, reply })
            .await
    }

    pub async fn settings(&self) -> Result<AutoDjSettings, OrchestratorError> {
        self.request(|reply| AutoDjCommand::GetSettings { reply }).await
    }

    /// Ask for an immediate progress check instead of waiting for the poll
    pub fn progress_update(&self) -> Result<(), OrchestratorError> {
        self.commands
            .send(AutoDjCommand::ProgressUpdate)
            .map_err(|_| OrchestratorError::Stopped)
    }

    /// Master level of the last rendered block
    pub fn meter(&self) -> MeterReading {
        self.engine.with_graph(|graph| graph.meter())
    }

    pub fn subscribe(&self) -> crossbeam::channel::Receiver<AutoDjEvent> {
        self.events.subscribe()
    }

    /// Stop the service and the audio engine
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        self.request(|reply| AutoDjCommand::Shutdown { reply }).await
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}
