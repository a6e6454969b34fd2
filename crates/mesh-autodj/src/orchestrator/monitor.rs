//! Playback progress monitor
//!
//! Pure state machine over the active deck's progress. It only decides
//! *when* to act; the orchestrator does the acting.
//!
//! ```text
//! Idle → Playing → SuggestionReady → TransitionPrepared → Transitioning → Idle
//! ```
//!
//! Each threshold fires at most once per loaded track, keyed on the deck
//! and the chain's load id, so seeking back and forth cannot re-trigger
//! preparation.

use std::fmt;

use crate::config::MonitorConfig;
use crate::types::DeckId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Idle,
    Playing,
    SuggestionReady,
    TransitionPrepared,
    Transitioning,
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorPhase::Idle => "idle",
            MonitorPhase::Playing => "playing",
            MonitorPhase::SuggestionReady => "suggestion ready",
            MonitorPhase::TransitionPrepared => "transition prepared",
            MonitorPhase::Transitioning => "transitioning",
        };
        f.write_str(name)
    }
}

/// What the orchestrator should do after an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    GenerateSuggestion,
    PrepareTransition,
}

/// One progress observation of the active deck
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub deck: DeckId,
    pub load_id: u64,
    pub position: f64,
    pub duration: f64,
    pub is_playing: bool,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.duration > 0.0 {
            (self.position / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn remaining(&self) -> f64 {
        (self.duration - self.position).max(0.0)
    }
}

pub struct ProgressMonitor {
    config: MonitorConfig,
    phase: MonitorPhase,
    current: Option<(DeckId, u64)>,
    suggested: bool,
    prepared: bool,
}

impl ProgressMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            phase: MonitorPhase::Idle,
            current: None,
            suggested: false,
            prepared: false,
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    /// Whether the suggestion threshold has been passed for the current track
    pub fn has_suggested(&self) -> bool {
        self.suggested
    }

    pub fn observe(&mut self, progress: Progress) -> Vec<MonitorAction> {
        let key = (progress.deck, progress.load_id);
        if self.current != Some(key) {
            self.current = Some(key);
            self.suggested = false;
            self.prepared = false;
            self.phase = MonitorPhase::Playing;
        }

        if self.phase == MonitorPhase::Transitioning
            || !progress.is_playing
            || progress.duration <= 0.0
        {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if !self.suggested && progress.fraction() >= self.config.suggestion_threshold {
            self.suggested = true;
            self.phase = MonitorPhase::SuggestionReady;
            actions.push(MonitorAction::GenerateSuggestion);
        }
        if !self.prepared
            && (progress.fraction() >= self.config.prepare_threshold
                || progress.remaining() <= self.config.prepare_remaining_secs)
        {
            self.prepared = true;
            self.phase = MonitorPhase::TransitionPrepared;
            actions.push(MonitorAction::PrepareTransition);
        }
        actions
    }

    pub fn begin_transition(&mut self) {
        self.phase = MonitorPhase::Transitioning;
    }

    /// A started transition was abandoned; the current track keeps its guards
    pub fn abort_transition(&mut self) {
        if self.phase == MonitorPhase::Transitioning {
            self.phase = if self.prepared {
                MonitorPhase::TransitionPrepared
            } else {
                MonitorPhase::Playing
            };
        }
    }

    /// The transition completed or the track ran out
    pub fn finish(&mut self) {
        self.phase = MonitorPhase::Idle;
    }

    /// Nothing is playing on the active deck
    pub fn clear(&mut self) {
        self.phase = MonitorPhase::Idle;
        self.current = None;
        self.suggested = false;
        self.prepared = false;
    }
}
