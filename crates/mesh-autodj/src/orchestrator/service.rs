//! The Auto-DJ service task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::messages::{AutoDjCommand, AutoDjEvent, EventBus, Internal, TransitionState};
use super::monitor::{MonitorAction, MonitorPhase, Progress, ProgressMonitor};
use super::AutoDjHandle;
use crate::config::{AutoDjConfig, AutoDjSettings};
use crate::crossfader::{deck_at, Crossfader, RampHandle};
use crate::deck::{DeckController, DeckState, SourceLoader};
use crate::engine::{AudioBackend, AudioEngine};
use crate::error::{LoadError, OrchestratorError, TransitionAbort};
use crate::scoring::{self, ScoredCandidate};
use crate::services::{PlayHistoryLog, SettingsStore, TrackCatalog};
use crate::track::{PlayHistoryEntry, Track};
use crate::transition::{spawn_automation, TransitionPlan, TransitionPlanner};
use crate::types::{DeckId, PerDeck};

/// External pieces the service is built from
pub struct Collaborators {
    pub catalog: Arc<dyn TrackCatalog>,
    pub history: Arc<dyn PlayHistoryLog>,
    pub settings: Arc<dyn SettingsStore>,
    pub loader: Arc<dyn SourceLoader>,
    pub backend: Box<dyn AudioBackend>,
}

/// Ranked candidates for the track after the active one
#[derive(Default)]
struct Selection {
    ranked: Vec<ScoredCandidate>,
    cursor: usize,
    /// User pick; wins over the ranking
    locked: Option<ScoredCandidate>,
}

impl Selection {
    fn current(&self) -> Option<&ScoredCandidate> {
        self.locked.as_ref().or_else(|| self.ranked.get(self.cursor))
    }

    fn clear(&mut self) {
        *self = Selection::default();
    }
}

/// Target chosen and loading (or loaded) on the idle deck
struct PendingTransition {
    id: u64,
    from: DeckId,
    to: DeckId,
    target: ScoredCandidate,
    auto_selected: bool,
    prepared_at: Instant,
    remaining_at_prepare: f64,
    plan: Option<TransitionPlan>,
    load_task: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl Drop for PendingTransition {
    fn drop(&mut self) {
        for task in [self.load_task.take(), self.timer.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

struct RunningTransition {
    id: u64,
    plan: TransitionPlan,
    target: Track,
    ramp: RampHandle,
    automation: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

impl Drop for RunningTransition {
    fn drop(&mut self) {
        self.automation.abort();
        self.watcher.abort();
    }
}

pub struct AutoDj {
    config: AutoDjConfig,
    settings: AutoDjSettings,
    engine: Arc<AudioEngine>,
    decks: PerDeck<Arc<DeckController>>,
    crossfader: Crossfader,
    planner: TransitionPlanner,
    monitor: ProgressMonitor,
    catalog: Arc<dyn TrackCatalog>,
    history: Arc<dyn PlayHistoryLog>,
    settings_store: Arc<dyn SettingsStore>,
    events: EventBus,
    internal_tx: mpsc::UnboundedSender<Internal>,
    active: DeckId,
    selection: Selection,
    pending: Option<PendingTransition>,
    running: Option<RunningTransition>,
    next_plan_id: u64,
}

impl AutoDj {
    /// Build the engine and decks and start the service task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: AutoDjConfig, parts: Collaborators) -> (AutoDjHandle, JoinHandle<()>) {
        let engine = Arc::new(AudioEngine::new(config.engine.clone(), parts.backend));
        let decks = PerDeck::from_fn(|deck| {
            Arc::new(DeckController::new(
                deck,
                Arc::clone(&engine),
                Arc::clone(&parts.loader),
                config.deck.clone(),
            ))
        });
        let crossfader = Crossfader::new(Arc::clone(&engine), &config.crossfader);
        crossfader.set_position(DeckId::A.crossfader_endpoint());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let events = EventBus::default();
        let settings = parts.settings.load();

        let service = AutoDj {
            planner: TransitionPlanner::new(config.transition.clone()),
            monitor: ProgressMonitor::new(config.monitor.clone()),
            config,
            settings,
            engine: Arc::clone(&engine),
            decks,
            crossfader,
            catalog: parts.catalog,
            history: parts.history,
            settings_store: parts.settings,
            events: events.clone(),
            internal_tx,
            active: DeckId::A,
            selection: Selection::default(),
            pending: None,
            running: None,
            next_plan_id: 0,
        };
        let task = tokio::spawn(service.run(command_rx, internal_rx));

        let handle = AutoDjHandle {
            commands: command_tx,
            events,
            engine,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<AutoDjCommand>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        log::info!(
            "AutoDj: started (enabled: {}, energy style: {})",
            self.settings.enabled,
            self.settings.energy_style
        );
        let mut poll = tokio::time::interval(self.config.monitor.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(AutoDjCommand::Shutdown { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(message) = internal.recv() => self.handle_internal(message).await,
                _ = poll.tick() => self.check_progress(),
            }
        }
        log::info!("AutoDj: stopped");
    }

    fn handle_command(&mut self, command: AutoDjCommand) {
        match command {
            AutoDjCommand::PlayTrack { deck, track, reply } => self.play_track(deck, track, reply),
            AutoDjCommand::GetSuggestion { reply } => {
                let _ = reply.send(self.selection.current().cloned());
            }
            AutoDjCommand::AcceptSuggestion { reply } => {
                if self.selection.locked.is_none() {
                    self.selection.locked = self.selection.current().cloned();
                }
                let _ = reply.send(self.selection.current().cloned());
                self.retarget();
            }
            AutoDjCommand::SkipSuggestion { reply } => {
                if self.selection.locked.take().is_none() && !self.selection.ranked.is_empty() {
                    self.selection.cursor += 1;
                }
                let _ = reply.send(self.selection.current().cloned());
                self.retarget();
            }
            AutoDjCommand::LockCandidate { track, reply } => {
                let result = self.lock_candidate(track);
                let _ = reply.send(result);
            }
            AutoDjCommand::UnlockCandidate { reply } => {
                self.selection.locked = None;
                if self.monitor.has_suggested() {
                    if let Some(current) = self.active_track() {
                        self.generate_suggestion(&current);
                    }
                }
                let _ = reply.send(());
                self.retarget();
            }
            AutoDjCommand::RequestTrackAtEnergy { level, reply } => {
                let result = self.request_energy(level);
                let _ = reply.send(result);
            }
            AutoDjCommand::GetTransitionState { reply } => {
                let _ = reply.send(self.transition_state());
            }
            AutoDjCommand::GetDeckState { deck, reply } => {
                let _ = reply.send(self.decks[deck].state());
            }
            AutoDjCommand::Seek {
                deck,
                seconds,
                reply,
            } => {
                self.decks[deck].seek(seconds);
                let _ = reply.send(());
            }
            AutoDjCommand::GetActiveDeck { reply } => {
                let _ = reply.send(self.active);
            }
            AutoDjCommand::SetCrossfaderPosition { position, reply } => {
                self.abort_running(TransitionAbort::ManualOverride);
                self.crossfader.set_position(position);
                self.follow_crossfader();
                let _ = reply.send(());
            }
            AutoDjCommand::SetEnabled { enabled, reply } => {
                let settings = AutoDjSettings {
                    enabled,
                    ..self.settings.clone()
                };
                self.apply_settings(settings);
                let _ = reply.send(());
            }
            AutoDjCommand::UpdateSettings { settings, reply } => {
                self.apply_settings(settings);
                let _ = reply.send(());
            }
            AutoDjCommand::GetSettings { reply } => {
                let _ = reply.send(self.settings.clone());
            }
            AutoDjCommand::ProgressUpdate => self.check_progress(),
            AutoDjCommand::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::CandidateLoaded { plan_id, result } => self.candidate_loaded(plan_id, result),
            Internal::FireTransition { plan_id } => self.fire_transition(plan_id).await,
            Internal::TransitionFinished { plan_id, completed } => {
                self.transition_finished(plan_id, completed)
            }
        }
    }

    // ── Playback monitoring ─────────────────────────────────────────────

    fn active_track(&self) -> Option<Track> {
        self.decks[self.active].state().track
    }

    fn check_progress(&mut self) {
        let state = self.decks[self.active].state();
        let Some(track) = state.track.clone() else {
            self.monitor.clear();
            return;
        };

        if state.ended && self.running.is_none() && self.monitor.phase() != MonitorPhase::Idle {
            log::info!(
                "AutoDj: '{}' ended on deck {} without a transition",
                track.display_name(),
                self.active
            );
            self.pending = None;
            self.monitor.finish();
            self.events.publish(AutoDjEvent::TrackEnded {
                deck: self.active,
                track_id: track.id,
            });
            return;
        }
        if !self.settings.enabled {
            return;
        }

        let actions = self.monitor.observe(Progress {
            deck: self.active,
            load_id: state.load_id,
            position: state.position,
            duration: state.duration,
            is_playing: state.is_playing,
        });
        for action in actions {
            match action {
                MonitorAction::GenerateSuggestion => match &self.selection.locked {
                    Some(locked) => log::debug!(
                        "AutoDj: '{}' is locked, not scoring the catalog",
                        locked.track.id
                    ),
                    None => self.generate_suggestion(&track),
                },
                MonitorAction::PrepareTransition => self.prepare_transition(&track, &state),
            }
        }
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// History entries needed for recency and the previous track's energy
    fn history_window(&self) -> usize {
        (self.settings.recency_limit as usize).max(2)
    }

    fn generate_suggestion(&mut self, reference: &Track) {
        let history = self.history.recent(self.history_window());
        let ranked = scoring::score(reference, &self.catalog.tracks(), &history, &self.settings);
        self.selection.ranked = ranked;
        self.selection.cursor = 0;

        match self.selection.current() {
            Some(candidate) => {
                log::info!(
                    "AutoDj: next after '{}': '{}' ({}: {})",
                    reference.id,
                    candidate.track.display_name(),
                    candidate.total,
                    candidate.reason()
                );
                self.events.publish(AutoDjEvent::SuggestionReady {
                    candidate: candidate.clone(),
                });
            }
            None => log::info!("AutoDj: no candidates to follow '{}'", reference.id),
        }
    }

    fn lock_candidate(&mut self, track: Track) -> Result<ScoredCandidate, OrchestratorError> {
        let reference = self.active_track().ok_or(OrchestratorError::NoTarget)?;
        // A lock is a user decision: never filter it out
        let settings = AutoDjSettings {
            strict_bpm: false,
            ..self.settings.clone()
        };
        let history = self.history.recent(self.history_window());
        let candidate = scoring::score(&reference, &[track], &history, &settings)
            .into_iter()
            .next()
            .ok_or(OrchestratorError::NoTarget)?;
        log::info!("AutoDj: locked '{}'", candidate.track.display_name());
        self.selection.locked = Some(candidate.clone());
        self.retarget();
        Ok(candidate)
    }

    fn request_energy(&mut self, level: u8) -> Result<ScoredCandidate, OrchestratorError> {
        let reference = self.active_track().ok_or(OrchestratorError::NoTarget)?;
        let history = self.history.recent(self.history_window());
        let candidate = scoring::find_by_energy(
            level,
            &reference,
            &self.catalog.tracks(),
            &history,
            &self.settings,
        )
        .ok_or(OrchestratorError::NoTarget)?;
        log::info!(
            "AutoDj: energy {} requested, locked '{}'",
            level,
            candidate.track.display_name()
        );
        self.selection.locked = Some(candidate.clone());
        self.retarget();
        Ok(candidate)
    }

    // ── Transition lifecycle ────────────────────────────────────────────

    fn prepare_transition(&mut self, current: &Track, state: &DeckState) {
        if self.pending.is_some() || self.running.is_some() {
            log::debug!("AutoDj: transition already pending");
            return;
        }
        if self.selection.current().is_none() {
            self.generate_suggestion(current);
        }
        let Some(target) = self.selection.current().cloned() else {
            log::warn!("AutoDj: nothing to prepare after '{}'", current.id);
            return;
        };

        self.next_plan_id += 1;
        let plan_id = self.next_plan_id;
        let from = self.active;
        let to = from.other();
        log::info!(
            "AutoDj: preparing '{}' on deck {}",
            target.track.display_name(),
            to
        );

        let deck = Arc::clone(&self.decks[to]);
        deck.pause();
        let track = target.track.clone();
        let tx = self.internal_tx.clone();
        let load_task = tokio::spawn(async move {
            let result = deck.load_track(&track).await;
            let _ = tx.send(Internal::CandidateLoaded { plan_id, result });
        });

        self.pending = Some(PendingTransition {
            id: plan_id,
            from,
            to,
            auto_selected: self.selection.locked.is_none(),
            target,
            prepared_at: Instant::now(),
            remaining_at_prepare: (state.duration - state.position).max(0.0),
            plan: None,
            load_task: Some(load_task),
            timer: None,
        });
    }

    /// Point a prepared transition at the current selection
    fn retarget(&mut self) {
        if self.running.is_some() || self.monitor.phase() != MonitorPhase::TransitionPrepared {
            return;
        }
        let wanted = self.selection.current().map(|c| c.track.id.clone());
        let auto_selected = self.selection.locked.is_none();
        if let Some(pending) = self.pending.as_mut() {
            if Some(&pending.target.track.id) == wanted.as_ref() {
                pending.auto_selected = auto_selected;
                return;
            }
        }
        self.cancel_pending(TransitionAbort::Superseded);

        let state = self.decks[self.active].state();
        if let Some(current) = state.track.clone() {
            self.prepare_transition(&current, &state);
        }
    }

    fn candidate_loaded(&mut self, plan_id: u64, result: Result<(), LoadError>) {
        let Some(pending) = self.pending.as_mut().filter(|p| p.id == plan_id) else {
            return;
        };
        pending.load_task = None;

        if let Err(e) = result {
            log::warn!(
                "AutoDj: could not load '{}' ({}); letting the current track play out",
                pending.target.track.id,
                e
            );
            self.events.publish(AutoDjEvent::CandidateLoadFailed {
                track_id: pending.target.track.id.clone(),
                error: e.to_string(),
            });
            self.pending = None;
            return;
        }

        let Some(current) = self.decks[pending.from].state().track else {
            self.pending = None;
            return;
        };
        let plan = self
            .planner
            .generate_plan(pending.from, &current, &pending.target.track);
        let lead = (pending.remaining_at_prepare - plan.duration.as_secs_f64()).max(0.0);
        let fire_at = pending.prepared_at + Duration::from_secs_f64(lead);
        let tx = self.internal_tx.clone();
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(fire_at).await;
            let _ = tx.send(Internal::FireTransition { plan_id });
        }));

        log::info!(
            "AutoDj: {} into '{}' in {:.1}s",
            plan.archetype,
            pending.target.track.id,
            fire_at.saturating_duration_since(Instant::now()).as_secs_f64()
        );
        self.events.publish(AutoDjEvent::TransitionPrepared {
            from: plan.from,
            to: plan.to,
            track_id: pending.target.track.id.clone(),
            archetype: plan.archetype,
        });
        pending.plan = Some(plan);
    }

    async fn fire_transition(&mut self, plan_id: u64) {
        if !matches!(&self.pending, Some(p) if p.id == plan_id) || !self.settings.enabled {
            return;
        }
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        let Some(mut plan) = pending.plan.take() else {
            return;
        };

        let outgoing = Arc::clone(&self.decks[plan.from]);
        let incoming = Arc::clone(&self.decks[plan.to]);
        plan.fit_to_decks(&outgoing, &incoming);
        self.monitor.begin_transition();

        // Lane start values land before the incoming deck is audible
        let automation = spawn_automation(
            &plan,
            Arc::clone(&outgoing),
            Arc::clone(&incoming),
            self.config.transition.automation_tick(),
        );
        if let Err(e) = incoming.play().await {
            automation.abort();
            outgoing.reset_automation();
            incoming.reset_automation();
            self.monitor.abort_transition();
            log::error!("AutoDj: deck {} failed to start: {}", plan.to, e);
            self.events.publish(AutoDjEvent::TransitionAborted {
                reason: TransitionAbort::IncomingFailed,
            });
            return;
        }

        self.history.append(PlayHistoryEntry::now(
            pending.target.track.id.clone(),
            pending.auto_selected,
        ));
        self.selection.clear();

        let ramp = self.crossfader.crossfade(plan.from, plan.duration);
        let mut watch = ramp.clone();
        let tx = self.internal_tx.clone();
        let watcher = tokio::spawn(async move {
            let completed = watch.finished().await;
            let _ = tx.send(Internal::TransitionFinished { plan_id, completed });
        });

        log::info!(
            "AutoDj: {} from deck {} to deck {} ({:.1}s)",
            plan.archetype,
            plan.from,
            plan.to,
            plan.duration.as_secs_f64()
        );
        self.events.publish(AutoDjEvent::TransitionStarted {
            from: plan.from,
            to: plan.to,
            archetype: plan.archetype,
        });
        self.running = Some(RunningTransition {
            id: plan_id,
            target: pending.target.track.clone(),
            plan,
            ramp,
            automation,
            watcher,
        });
    }

    fn transition_finished(&mut self, plan_id: u64, completed: bool) {
        if !completed || !matches!(&self.running, Some(r) if r.id == plan_id) {
            return;
        }
        let Some(running) = self.running.take() else {
            return;
        };
        let (from, to) = (running.plan.from, running.plan.to);
        drop(running);

        self.decks[from].pause();
        self.decks[from].reset_automation();
        self.decks[to].reset_automation();
        self.active = to;
        self.monitor.finish();
        log::info!("AutoDj: transition complete, deck {} is live", to);
        self.events.publish(AutoDjEvent::TransitionCompleted { active: to });
    }

    fn cancel_pending(&mut self, reason: TransitionAbort) {
        if let Some(pending) = self.pending.take() {
            log::info!(
                "AutoDj: dropped pending transition to '{}': {}",
                pending.target.track.id,
                reason
            );
            self.events.publish(AutoDjEvent::TransitionAborted { reason });
        }
    }

    fn abort_running(&mut self, reason: TransitionAbort) {
        let Some(running) = self.running.take() else {
            return;
        };
        self.crossfader.cancel_ramp();
        let (from, to) = (running.plan.from, running.plan.to);
        drop(running);

        self.decks[from].reset_automation();
        self.decks[to].reset_automation();
        self.monitor.abort_transition();
        log::info!("AutoDj: transition cancelled: {}", reason);
        self.events.publish(AutoDjEvent::TransitionAborted { reason });
    }

    fn cancel_all(&mut self, reason: TransitionAbort) {
        self.cancel_pending(reason);
        self.abort_running(reason);
    }

    /// Make the deck the crossfader favours active, if it has a track
    fn follow_crossfader(&mut self) {
        let side = deck_at(self.crossfader.position());
        if side != self.active && self.decks[side].state().track.is_some() {
            log::info!("AutoDj: deck {} is now active", side);
            self.active = side;
        }
    }

    fn transition_state(&self) -> TransitionState {
        if let Some(running) = &self.running {
            return TransitionState {
                is_active: true,
                from_deck: Some(running.plan.from),
                to_deck: Some(running.plan.to),
                archetype: Some(running.plan.archetype),
                progress: running.ramp.progress(),
                target: Some(running.target.id.clone()),
            };
        }
        if let Some(pending) = &self.pending {
            return TransitionState {
                is_active: false,
                from_deck: Some(pending.from),
                to_deck: Some(pending.to),
                archetype: pending.plan.as_ref().map(|plan| plan.archetype),
                progress: 0.0,
                target: Some(pending.target.track.id.clone()),
            };
        }
        TransitionState::default()
    }

    // ── User actions ────────────────────────────────────────────────────

    fn play_track(
        &mut self,
        deck: DeckId,
        track: Track,
        reply: tokio::sync::oneshot::Sender<Result<(), OrchestratorError>>,
    ) {
        self.cancel_all(TransitionAbort::Superseded);
        self.selection.clear();
        self.active = deck;
        self.crossfader.set_position(deck.crossfader_endpoint());

        let controller = Arc::clone(&self.decks[deck]);
        let history = Arc::clone(&self.history);
        tokio::spawn(async move {
            let result = async {
                controller.load_track(&track).await?;
                controller.play().await?;
                history.append(PlayHistoryEntry::now(track.id.clone(), false));
                Ok::<(), OrchestratorError>(())
            }
            .await;
            if let Err(e) = &result {
                log::error!("AutoDj: could not start '{}' on deck {}: {}", track.id, deck, e);
            }
            let _ = reply.send(result);
        });
    }

    fn apply_settings(&mut self, settings: AutoDjSettings) {
        if settings == self.settings {
            return;
        }
        if let Err(e) = self.settings_store.save(&settings) {
            log::warn!("AutoDj: failed to persist settings: {:#}", e);
        }
        let was_enabled = self.settings.enabled;
        self.settings = settings;

        if was_enabled != self.settings.enabled {
            log::info!(
                "AutoDj: {}",
                if self.settings.enabled { "enabled" } else { "disabled" }
            );
            if !self.settings.enabled {
                self.cancel_all(TransitionAbort::Disabled);
                self.follow_crossfader();
            }
            self.events.publish(AutoDjEvent::EnabledChanged {
                enabled: self.settings.enabled,
            });
        }
        // Re-rank under the new preferences unless the user pinned a pick
        if self.settings.enabled && self.selection.locked.is_none() && self.monitor.has_suggested() {
            if let Some(current) = self.active_track() {
                self.generate_suggestion(&current);
                self.retarget();
            }
        }
    }

    fn shutdown(&mut self) {
        self.cancel_all(TransitionAbort::Shutdown);
        self.crossfader.cancel_ramp();
        self.engine.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::deck::{LoadFuture, TrackLoader};
    use crate::engine::ClockedBackend;
    use crate::services::{MemoryHistory, MemorySettingsStore, StaticCatalog};
    use crate::transition::Archetype;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn catalog() -> Vec<Track> {
        vec![
            Track::new("t1", "Opener")
                .with_duration(40.0)
                .with_bpm(128.0)
                .with_key("8A")
                .with_energy(6),
            Track::new("t2", "Lift")
                .with_duration(40.0)
                .with_bpm(128.0)
                .with_key("8A")
                .with_energy(7),
            Track::new("t3", "Neighbour")
                .with_duration(40.0)
                .with_bpm(126.0)
                .with_key("9A")
                .with_energy(6),
            Track::new("t4", "Downtempo")
                .with_duration(40.0)
                .with_bpm(90.0)
                .with_key("2B")
                .with_energy(2),
        ]
    }

    fn track(id: &str) -> Track {
        catalog().into_iter().find(|t| t.id == id).unwrap()
    }

    /// Loads everything except `id`, which is always unreachable
    struct OfflineTrack {
        id: &'static str,
        attempts: Arc<AtomicUsize>,
    }

    impl SourceLoader for OfflineTrack {
        fn open(&self, track: &Track) -> LoadFuture {
            if track.id == self.id {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                return Box::pin(async { Err(LoadError::Unreachable("offline".into())) });
            }
            TrackLoader.open(track)
        }
    }

    /// Catalog that counts how often it is listed
    struct CountingCatalog {
        inner: StaticCatalog,
        reads: Arc<AtomicUsize>,
    }

    impl TrackCatalog for CountingCatalog {
        fn tracks(&self) -> Vec<Track> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.tracks()
        }
    }

    struct Harness {
        handle: AutoDjHandle,
        task: JoinHandle<()>,
        events: crossbeam::channel::Receiver<AutoDjEvent>,
        history: Arc<MemoryHistory>,
        settings: Arc<MemorySettingsStore>,
        start: Instant,
    }

    impl Harness {
        async fn start(loader: Arc<dyn SourceLoader>) -> Self {
            Self::start_with(loader, Arc::new(StaticCatalog::new(catalog()))).await
        }

        async fn start_with(loader: Arc<dyn SourceLoader>, tracks: Arc<dyn TrackCatalog>) -> Self {
            let config = AutoDjConfig {
                engine: EngineConfig {
                    sample_rate: 1000,
                    block_size: 100,
                    ..Default::default()
                },
                ..Default::default()
            };
            let history = Arc::new(MemoryHistory::default());
            let settings = Arc::new(MemorySettingsStore::new(AutoDjSettings::default()));
            let (handle, task) = AutoDj::spawn(
                config,
                Collaborators {
                    catalog: tracks,
                    history: history.clone(),
                    settings: settings.clone(),
                    loader,
                    backend: Box::new(ClockedBackend::null()),
                },
            );
            let events = handle.subscribe();
            let start = Instant::now();
            handle.play_track(DeckId::A, track("t1")).await.unwrap();
            Harness {
                handle,
                task,
                events,
                history,
                settings,
                start,
            }
        }

        async fn default_loader() -> Self {
            Self::start(Arc::new(TrackLoader)).await
        }

        /// Advance the paused clock to `secs` after playback started
        async fn at(&self, secs: f64) {
            tokio::time::sleep_until(self.start + Duration::from_secs_f64(secs)).await;
        }

        fn drain(&self) -> Vec<AutoDjEvent> {
            self.events.try_iter().collect()
        }

        async fn deck(&self, deck: DeckId) -> DeckState {
            self.handle.get_deck_state(deck).await.unwrap()
        }
    }

    fn loaded_id(state: &DeckState) -> Option<&str> {
        state.track.as_ref().map(|t| t.id.as_str())
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_transition_cycle() {
        let h = Harness::default_loader().await;

        h.at(19.0).await;
        assert!(h.handle.get_suggestion().await.unwrap().is_none());

        h.at(21.0).await;
        let suggestion = h.handle.get_suggestion().await.unwrap().unwrap();
        assert_eq!(suggestion.track.id, "t2");
        assert_eq!(suggestion.total, 100);

        h.at(27.0).await;
        let b = h.deck(DeckId::B).await;
        assert_eq!(loaded_id(&b), Some("t2"));
        assert!(!b.is_playing);
        let state = h.handle.get_transition_state().await.unwrap();
        assert!(!state.is_active);
        assert_eq!(state.archetype, Some(Archetype::BeatMatched));
        assert_eq!(state.target.as_deref(), Some("t2"));

        h.at(31.0).await;
        assert!(!h.handle.get_transition_state().await.unwrap().is_active);

        h.at(34.0).await;
        let state = h.handle.get_transition_state().await.unwrap();
        assert!(state.is_active);
        assert_eq!(state.from_deck, Some(DeckId::A));
        assert_eq!(state.to_deck, Some(DeckId::B));
        assert!(state.progress > 0.0 && state.progress < 1.0);
        assert!(h.deck(DeckId::B).await.is_playing);

        h.at(42.0).await;
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::B);
        assert!(!h.deck(DeckId::A).await.is_playing);
        assert!(h.deck(DeckId::B).await.is_playing);
        assert!(!h.handle.get_transition_state().await.unwrap().is_active);

        let history = h.history.recent(10);
        let ids: Vec<(&str, bool)> = history
            .iter()
            .map(|e| (e.track_id.as_str(), e.auto_selected))
            .collect();
        assert_eq!(ids, [("t2", true), ("t1", false)]);

        let events = h.drain();
        let started = events.iter().position(|e| {
            matches!(e, AutoDjEvent::TransitionStarted { archetype: Archetype::BeatMatched, .. })
        });
        let completed = events
            .iter()
            .position(|e| *e == AutoDjEvent::TransitionCompleted { active: DeckId::B });
        assert!(started.unwrap() < completed.unwrap());
        assert!(!events
            .iter()
            .any(|e| matches!(e, AutoDjEvent::TrackEnded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_candidate_load_failure_lets_track_play_out() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let h = Harness::start(Arc::new(OfflineTrack {
            id: "t2",
            attempts: Arc::clone(&attempts),
        }))
        .await;

        h.at(29.0).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(h.drain().iter().any(|e| matches!(
            e,
            AutoDjEvent::CandidateLoadFailed { track_id, .. } if track_id == "t2"
        )));

        // Passing the thresholds again must not retry the same track
        h.handle.seek(DeckId::A, 5.0).await.unwrap();
        h.at(66.0).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let events = h.drain();
        assert!(events.contains(&AutoDjEvent::TrackEnded {
            deck: DeckId::A,
            track_id: "t1".into(),
        }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, AutoDjEvent::TransitionStarted { .. })));
        assert!(loaded_id(&h.deck(DeckId::B).await).is_none());
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::A);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_prepared_transition() {
        let h = Harness::default_loader().await;

        h.at(27.0).await;
        assert_eq!(loaded_id(&h.deck(DeckId::B).await), Some("t2"));
        h.handle.set_enabled(false).await.unwrap();

        let events = h.drain();
        assert!(events.contains(&AutoDjEvent::TransitionAborted {
            reason: TransitionAbort::Disabled
        }));
        assert!(events.contains(&AutoDjEvent::EnabledChanged { enabled: false }));
        assert!(!h.settings.load().enabled);

        h.at(42.0).await;
        assert!(!h.deck(DeckId::B).await.is_playing);
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::A);
        assert!(!h.handle.get_transition_state().await.unwrap().is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_candidate_is_prepared() {
        let h = Harness::default_loader().await;

        h.at(22.0).await;
        let locked = h.handle.lock_candidate(track("t3")).await.unwrap();
        assert_eq!(locked.track.id, "t3");
        assert_eq!(
            h.handle.get_suggestion().await.unwrap().unwrap().track.id,
            "t3"
        );

        h.at(27.0).await;
        assert_eq!(loaded_id(&h.deck(DeckId::B).await), Some("t3"));

        h.at(42.0).await;
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::B);
        let latest = &h.history.recent(1)[0];
        assert_eq!(latest.track_id, "t3");
        assert!(!latest.auto_selected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_candidate_skips_scoring() {
        let reads = Arc::new(AtomicUsize::new(0));
        let h = Harness::start_with(
            Arc::new(TrackLoader),
            Arc::new(CountingCatalog {
                inner: StaticCatalog::new(catalog()),
                reads: Arc::clone(&reads),
            }),
        )
        .await;

        h.at(5.0).await;
        h.handle.lock_candidate(track("t3")).await.unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        // Past the suggestion threshold and into preparation
        h.at(27.0).await;
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert!(!h
            .drain()
            .iter()
            .any(|e| matches!(e, AutoDjEvent::SuggestionReady { .. })));
        assert_eq!(loaded_id(&h.deck(DeckId::B).await), Some("t3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_without_active_track_fails() {
        let (handle, _task) = AutoDj::spawn(
            AutoDjConfig::default(),
            Collaborators {
                catalog: Arc::new(StaticCatalog::new(catalog())),
                history: Arc::new(MemoryHistory::default()),
                settings: Arc::new(MemorySettingsStore::new(AutoDjSettings::default())),
                loader: Arc::new(TrackLoader),
                backend: Box::new(ClockedBackend::null()),
            },
        );
        assert_eq!(
            handle.lock_candidate(track("t3")).await,
            Err(OrchestratorError::NoTarget)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_crossfader_aborts_running_transition() {
        let h = Harness::default_loader().await;

        h.at(34.0).await;
        assert!(h.handle.get_transition_state().await.unwrap().is_active);
        h.handle.set_crossfader_position(0.2).await.unwrap();

        assert!(!h.handle.get_transition_state().await.unwrap().is_active);
        assert!(h.drain().contains(&AutoDjEvent::TransitionAborted {
            reason: TransitionAbort::ManualOverride
        }));
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::A);

        h.at(38.0).await;
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::A);
        assert!(!h
            .drain()
            .iter()
            .any(|e| matches!(e, AutoDjEvent::TransitionCompleted { .. })));

        // Pulling the fader over hands the set to the other deck
        h.handle.set_crossfader_position(0.9).await.unwrap();
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::B);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_retargets_prepared_transition() {
        let h = Harness::default_loader().await;

        h.at(27.0).await;
        assert_eq!(loaded_id(&h.deck(DeckId::B).await), Some("t2"));
        let next = h.handle.skip_suggestion().await.unwrap().unwrap();
        assert_eq!(next.track.id, "t3");
        assert!(h.drain().contains(&AutoDjEvent::TransitionAborted {
            reason: TransitionAbort::Superseded
        }));

        h.at(28.0).await;
        assert_eq!(loaded_id(&h.deck(DeckId::B).await), Some("t3"));
        assert_eq!(
            h.handle.get_transition_state().await.unwrap().target.as_deref(),
            Some("t3")
        );

        h.at(42.0).await;
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::B);
        assert_eq!(h.history.recent(1)[0].track_id, "t3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_then_accept_suggestion() {
        let h = Harness::default_loader().await;

        h.at(27.0).await;
        h.handle.lock_candidate(track("t3")).await.unwrap();
        h.at(28.0).await;
        assert_eq!(loaded_id(&h.deck(DeckId::B).await), Some("t3"));

        // Unlocking falls back to the ranked suggestion
        h.handle.unlock_candidate().await.unwrap();
        h.at(29.0).await;
        assert_eq!(loaded_id(&h.deck(DeckId::B).await), Some("t2"));

        let accepted = h.handle.accept_suggestion().await.unwrap().unwrap();
        assert_eq!(accepted.track.id, "t2");
        assert_eq!(
            h.handle.get_transition_state().await.unwrap().target.as_deref(),
            Some("t2")
        );

        h.at(42.0).await;
        assert_eq!(h.handle.active_deck().await.unwrap(), DeckId::B);
        let latest = &h.history.recent(1)[0];
        assert_eq!(latest.track_id, "t2");
        assert!(!latest.auto_selected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_track_at_energy() {
        let h = Harness::default_loader().await;

        h.at(5.0).await;
        let pick = h.handle.request_track_at_energy(2).await.unwrap();
        assert_eq!(pick.track.id, "t4");
        assert_eq!(
            h.handle.get_suggestion().await.unwrap().unwrap().track.id,
            "t4"
        );

        assert_eq!(
            h.handle.request_track_at_energy(10).await,
            Err(OrchestratorError::NoTarget)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_settings_persists() {
        let h = Harness::default_loader().await;

        let settings = AutoDjSettings {
            strict_bpm: true,
            recency_limit: 4,
            ..Default::default()
        };
        h.handle.update_settings(settings.clone()).await.unwrap();

        assert_eq!(h.handle.settings().await.unwrap(), settings);
        assert_eq!(h.settings.load(), settings);
        // Enabled flag unchanged: no toggle event
        assert!(!h
            .drain()
            .iter()
            .any(|e| matches!(e, AutoDjEvent::EnabledChanged { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_service() {
        let h = Harness::default_loader().await;
        assert!(h.handle.is_running());

        h.handle.shutdown().await.unwrap();
        h.task.await.unwrap();

        assert!(!h.handle.is_running());
        assert_eq!(
            h.handle.get_suggestion().await,
            Err(OrchestratorError::Stopped)
        );
        assert_eq!(h.handle.progress_update(), Err(OrchestratorError::Stopped));
    }
}
