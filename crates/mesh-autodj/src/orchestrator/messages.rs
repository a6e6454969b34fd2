//! Commands, replies and events of the Auto-DJ service
//!
//! Commands are request-reply over oneshot channels; events are broadcast
//! on the [`EventBus`] for whoever is listening (UI, logging, tests).

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam::channel::{Receiver, Sender, TrySendError};
use tokio::sync::oneshot;

use crate::config::AutoDjSettings;
use crate::deck::DeckState;
use crate::error::{LoadError, OrchestratorError, TransitionAbort};
use crate::scoring::ScoredCandidate;
use crate::track::{Track, TrackId};
use crate::transition::Archetype;
use crate::types::DeckId;

type Reply<T> = oneshot::Sender<T>;

pub(super) enum AutoDjCommand {
    /// Load a track onto a deck and start it, making that deck active
    PlayTrack {
        deck: DeckId,
        track: Track,
        reply: Reply<Result<(), OrchestratorError>>,
    },
    GetSuggestion {
        reply: Reply<Option<ScoredCandidate>>,
    },
    AcceptSuggestion {
        reply: Reply<Option<ScoredCandidate>>,
    },
    SkipSuggestion {
        reply: Reply<Option<ScoredCandidate>>,
    },
    LockCandidate {
        track: Track,
        reply: Reply<Result<ScoredCandidate, OrchestratorError>>,
    },
    UnlockCandidate {
        reply: Reply<()>,
    },
    RequestTrackAtEnergy {
        level: u8,
        reply: Reply<Result<ScoredCandidate, OrchestratorError>>,
    },
    GetTransitionState {
        reply: Reply<TransitionState>,
    },
    GetDeckState {
        deck: DeckId,
        reply: Reply<DeckState>,
    },
    Seek {
        deck: DeckId,
        seconds: f64,
        reply: Reply<()>,
    },
    GetActiveDeck {
        reply: Reply<DeckId>,
    },
    SetCrossfaderPosition {
        position: f32,
        reply: Reply<()>,
    },
    SetEnabled {
        enabled: bool,
        reply: Reply<()>,
    },
    UpdateSettings {
        settings: AutoDjSettings,
        reply: Reply<()>,
    },
    GetSettings {
        reply: Reply<AutoDjSettings>,
    },
    /// Re-evaluate playback progress now instead of waiting for the poll
    ProgressUpdate,
    Shutdown {
        reply: Reply<()>,
    },
}

/// Messages the service sends itself from spawned work
#[derive(Debug)]
pub(super) enum Internal {
    CandidateLoaded {
        plan_id: u64,
        result: Result<(), LoadError>,
    },
    FireTransition {
        plan_id: u64,
    },
    TransitionFinished {
        plan_id: u64,
        completed: bool,
    },
}

/// Snapshot of the transition machinery for the presentation layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionState {
    /// A crossfade is running
    pub is_active: bool,
    pub from_deck: Option<DeckId>,
    pub to_deck: Option<DeckId>,
    pub archetype: Option<Archetype>,
    /// Ramp progress 0.0-1.0 while active
    pub progress: f32,
    /// Track waiting on the idle deck
    pub target: Option<TrackId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoDjEvent {
    SuggestionReady {
        candidate: ScoredCandidate,
    },
    TransitionPrepared {
        from: DeckId,
        to: DeckId,
        track_id: TrackId,
        archetype: Archetype,
    },
    CandidateLoadFailed {
        track_id: TrackId,
        error: String,
    },
    TransitionStarted {
        from: DeckId,
        to: DeckId,
        archetype: Archetype,
    },
    TransitionCompleted {
        active: DeckId,
    },
    TransitionAborted {
        reason: TransitionAbort,
    },
    TrackEnded {
        deck: DeckId,
        track_id: TrackId,
    },
    EnabledChanged {
        enabled: bool,
    },
}

/// Broadcast channel for [`AutoDjEvent`]s
///
/// Every subscriber gets its own bounded queue and sees each event
/// published after it subscribed.
#[derive(Clone)]
pub struct EventBus {
    capacity: usize,
    subscribers: Arc<Mutex<Vec<Sender<AutoDjEvent>>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<AutoDjEvent> {
        let (sender, receiver) = crossbeam::channel::bounded(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Publish without blocking
    ///
    /// A subscriber whose queue is full misses the event; dropped receivers
    /// are forgotten.
    pub fn publish(&self, event: AutoDjEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                log::debug!("EventBus: subscriber lagging, dropped {:?}", dropped);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber_count(bus: &EventBus) -> usize {
        bus.subscribers.lock().unwrap().len()
    }

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        bus.publish(AutoDjEvent::EnabledChanged { enabled: false });
        assert_eq!(rx.recv().unwrap(), AutoDjEvent::EnabledChanged { enabled: false });
    }

    #[test]
    fn test_every_subscriber_sees_every_event() {
        let bus = EventBus::new(16);
        let ui = bus.subscribe();
        let logger = bus.clone().subscribe();

        bus.publish(AutoDjEvent::EnabledChanged { enabled: true });
        bus.publish(AutoDjEvent::TransitionCompleted { active: DeckId::B });

        for rx in [&ui, &logger] {
            let events: Vec<_> = rx.try_iter().collect();
            assert_eq!(
                events,
                [
                    AutoDjEvent::EnabledChanged { enabled: true },
                    AutoDjEvent::TransitionCompleted { active: DeckId::B },
                ]
            );
        }
    }

    #[test]
    fn test_late_subscriber_gets_no_backlog() {
        let bus = EventBus::new(4);
        // Nobody listening: nothing is queued
        for _ in 0..10 {
            bus.publish(AutoDjEvent::EnabledChanged { enabled: true });
        }
        let rx = bus.subscribe();
        assert_eq!(rx.try_iter().count(), 0);

        bus.publish(AutoDjEvent::EnabledChanged { enabled: false });
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_full_subscriber_drops_instead_of_blocking() {
        let bus = EventBus::new(1);
        let slow = bus.subscribe();
        bus.publish(AutoDjEvent::EnabledChanged { enabled: true });
        bus.publish(AutoDjEvent::EnabledChanged { enabled: false });
        assert_eq!(slow.try_iter().count(), 1);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new(4);
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(subscriber_count(&bus), 2);

        bus.publish(AutoDjEvent::EnabledChanged { enabled: true });
        assert_eq!(subscriber_count(&bus), 1);
        assert_eq!(kept.try_iter().count(), 1);
    }
}
