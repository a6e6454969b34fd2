//! Deck controllers
//!
//! A [`DeckController`] drives one playback chain: loading with retry and
//! timeout, starting the engine on first play, and the automation hooks the
//! transition runner writes through. All state lives in the chain inside
//! the mixing graph; the controller only adds the async orchestration.

mod loader;

pub use loader::{LoadFuture, SourceLoader, TrackLoader};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::config::DeckConfig;
use crate::effect::EffectKind;
pub use crate::engine::DeckState;
use crate::engine::{AudioEngine, EqBand};
use crate::error::{LoadError, LoadResult, PlayError, PlayResult};
use crate::track::Track;
use crate::types::DeckId;

pub struct DeckController {
    deck: DeckId,
    engine: Arc<AudioEngine>,
    loader: Arc<dyn SourceLoader>,
    config: DeckConfig,
    /// Serializes loads on this deck
    load_lock: AsyncMutex<()>,
    /// Serializes play starts on this deck
    start_lock: AsyncMutex<()>,
    /// Bumped by every play/pause; a start that sees a newer value yields
    transport_generation: AtomicU64,
}

impl DeckController {
    pub fn new(
        deck: DeckId,
        engine: Arc<AudioEngine>,
        loader: Arc<dyn SourceLoader>,
        config: DeckConfig,
    ) -> Self {
        Self {
            deck,
            engine,
            loader,
            config,
            load_lock: AsyncMutex::new(()),
            start_lock: AsyncMutex::new(()),
            transport_generation: AtomicU64::new(0),
        }
    }

    pub fn deck(&self) -> DeckId {
        self.deck
    }

    /// Load `track`, retrying transient failures with linear backoff
    ///
    /// On success the deck is stopped at position 0 with the track's
    /// duration. On failure exactly one error is returned and whatever was
    /// loaded before stays loaded.
    pub async fn load_track(&self, track: &Track) -> LoadResult<()> {
        let _guard = self.load_lock.lock().await;
        let attempts = self.config.max_load_attempts.max(1);
        let timeout = self.config.metadata_timeout();
        let mut last_error = LoadError::Unreachable("no load attempt made".into());

        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(timeout, self.loader.open(track)).await {
                Ok(result) => result,
                Err(_) => Err(LoadError::Timeout {
                    timeout_ms: self.config.metadata_timeout_ms,
                }),
            };

            match result {
                Ok(source) => {
                    let duration = source.duration();
                    self.engine
                        .with_graph(|graph| graph.chain_mut(self.deck).load(track.clone(), source));
                    log::info!(
                        "Deck {}: loaded '{}' ({:.1}s) on attempt {}",
                        self.deck,
                        track.display_name(),
                        duration,
                        attempt
                    );
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "Deck {}: load attempt {}/{} for '{}' failed: {}",
                        self.deck,
                        attempt,
                        attempts,
                        track.id,
                        e
                    );
                    let transient = e.is_transient();
                    last_error = e;
                    if !transient {
                        break;
                    }
                    if attempt < attempts {
                        tokio::time::sleep(self.config.backoff(attempt)).await;
                    }
                }
            }
        }

        log::warn!(
            "Deck {}: giving up on '{}': {}",
            self.deck,
            track.id,
            last_error
        );
        Err(last_error)
    }

    /// Start playback, bringing the audio engine up first if needed
    ///
    /// Concurrent calls are serialized; a start overtaken by a later
    /// play/pause returns `Ok` without touching the transport.
    pub async fn play(&self) -> PlayResult<()> {
        let generation = self.transport_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = self.start_lock.lock().await;
        if self.is_superseded(generation) {
            log::debug!("Deck {}: play superseded before start", self.deck);
            return Ok(());
        }
        if !self.engine.with_graph(|graph| graph.chain(self.deck).is_loaded()) {
            return Err(PlayError::NothingLoaded(self.deck));
        }

        self.engine.ensure_running().await?;

        if self.is_superseded(generation) {
            log::debug!("Deck {}: play superseded during engine start", self.deck);
            return Ok(());
        }
        self.engine.with_graph(|graph| graph.chain_mut(self.deck).start());
        log::debug!("Deck {}: playing", self.deck);
        Ok(())
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.transport_generation.load(Ordering::Acquire) != generation
    }

    /// No-op when nothing is loaded
    pub fn pause(&self) {
        self.transport_generation.fetch_add(1, Ordering::AcqRel);
        self.engine.with_graph(|graph| graph.chain_mut(self.deck).pause());
    }

    /// No-op when nothing is loaded
    pub fn seek(&self, seconds: f64) {
        self.engine.with_graph(|graph| graph.chain_mut(self.deck).seek(seconds));
    }

    pub fn set_volume(&self, volume: f32) {
        self.engine.with_graph(|graph| graph.chain_mut(self.deck).set_volume(volume));
    }

    pub fn state(&self) -> DeckState {
        self.engine.with_graph(|graph| graph.chain(self.deck).snapshot())
    }

    pub fn set_eq_db(&self, band: EqBand, db: f32) {
        self.engine.with_graph(|graph| graph.chain_mut(self.deck).set_eq_db(band, db));
    }

    pub fn eq_db(&self, band: EqBand) -> f32 {
        self.engine.with_graph(|graph| graph.chain(self.deck).eq_db(band))
    }

    pub fn has_effect(&self, kind: EffectKind) -> bool {
        self.engine.with_graph(|graph| graph.chain(self.deck).has_effect(kind))
    }

    /// Returns false if this deck's chain does not host `kind`
    pub fn set_effect_amount(&self, kind: EffectKind, amount: f32) -> bool {
        self.engine
            .with_graph(|graph| graph.chain_mut(self.deck).set_effect_amount(kind, amount))
    }

    /// Flat EQ and dry effects
    pub fn reset_automation(&self) {
        self.engine.with_graph(|graph| graph.chain_mut(self.deck).reset_automation());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{ClockedBackend, TrackSource};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Fails the first `failures` attempts with `error`, then succeeds
    struct ScriptedLoader {
        failures: usize,
        error: LoadError,
        attempts: Arc<AtomicUsize>,
    }

    impl SourceLoader for ScriptedLoader {
        fn open(&self, track: &Track) -> LoadFuture {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            let result = if attempt < self.failures {
                Err(self.error.clone())
            } else {
                Ok(TrackSource::silent(track.duration))
            };
            Box::pin(async move { result })
        }
    }

    /// Never reports metadata
    struct HangingLoader;

    impl SourceLoader for HangingLoader {
        fn open(&self, _track: &Track) -> LoadFuture {
            Box::pin(std::future::pending())
        }
    }

    fn engine() -> Arc<AudioEngine> {
        let config = EngineConfig {
            sample_rate: 1000,
            block_size: 100,
            ..Default::default()
        };
        Arc::new(AudioEngine::new(config, Box::new(ClockedBackend::null())))
    }

    fn deck_with(loader: impl SourceLoader + 'static) -> DeckController {
        DeckController::new(DeckId::A, engine(), Arc::new(loader), DeckConfig::default())
    }

    fn scripted(failures: usize, error: LoadError) -> (ScriptedLoader, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let loader = ScriptedLoader {
            failures,
            error,
            attempts: Arc::clone(&attempts),
        };
        (loader, attempts)
    }

    fn track(id: &str) -> Track {
        Track::new(id, id).with_duration(60.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_succeeds_after_transient_failures() {
        let (loader, attempts) = scripted(2, LoadError::Unreachable("network".into()));
        let deck = deck_with(loader);
        let started = Instant::now();

        deck.load_track(&track("t1")).await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Backoff 1s after attempt 1, 2s after attempt 2
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        let state = deck.state();
        assert_eq!(state.track.unwrap().id, "t1");
        assert_eq!(state.duration, 60.0);
        assert_eq!(state.position, 0.0);
        assert!(!state.is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_gives_up_with_single_error_and_keeps_previous() {
        let (loader, _) = scripted(1, LoadError::Unreachable("network".into()));
        let deck = deck_with(loader);
        // First load burns the one failure, then succeeds
        deck.load_track(&track("old")).await.unwrap();

        let (failing, failing_attempts) = scripted(usize::MAX, LoadError::Unreachable("gone".into()));
        let deck = DeckController::new(
            DeckId::A,
            Arc::clone(&deck.engine),
            Arc::new(failing),
            DeckConfig::default(),
        );

        let err = deck.load_track(&track("new")).await.unwrap_err();
        assert_eq!(err, LoadError::Unreachable("gone".into()));
        assert_eq!(failing_attempts.load(Ordering::SeqCst), 3);
        assert_eq!(deck.state().track.unwrap().id, "old");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let (loader, attempts) = scripted(usize::MAX, LoadError::Decode("corrupt".into()));
        let deck = deck_with(loader);
        let started = Instant::now();
        assert!(deck.load_track(&track("t1")).await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_timeout_per_attempt() {
        let deck = deck_with(HangingLoader);
        let started = Instant::now();
        let err = deck.load_track(&track("t1")).await.unwrap_err();
        assert_eq!(err, LoadError::Timeout { timeout_ms: 10_000 });
        // 3 × 10s timeouts + 1s + 2s backoff
        assert_eq!(started.elapsed(), Duration::from_secs(33));
        assert!(deck.state().track.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_starts_engine_lazily() {
        let (loader, _) = scripted(0, LoadError::Decode(String::new()));
        let deck = deck_with(loader);
        assert!(matches!(deck.play().await, Err(PlayError::NothingLoaded(DeckId::A))));
        assert!(!deck.engine.is_started());

        deck.load_track(&track("t1")).await.unwrap();
        deck.play().await.unwrap();
        assert!(deck.engine.is_started());
        assert!(deck.state().is_playing);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let position = deck.state().position;
        assert!((1.0..=1.1).contains(&position), "position {position}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_resumes_suspended_engine() {
        let (loader, _) = scripted(0, LoadError::Decode(String::new()));
        let deck = deck_with(loader);
        deck.load_track(&track("t1")).await.unwrap();
        deck.play().await.unwrap();
        deck.engine.suspend();
        assert!(deck.engine.is_suspended());

        deck.play().await.unwrap();
        assert!(!deck.engine.is_suspended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_plays_are_benign() {
        let (loader, _) = scripted(0, LoadError::Decode(String::new()));
        let deck = deck_with(loader);
        deck.load_track(&track("t1")).await.unwrap();
        let (first, second) = tokio::join!(deck.play(), deck.play());
        first.unwrap();
        second.unwrap();
        assert!(deck.state().is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_seek_without_track() {
        let deck = deck_with(HangingLoader);
        deck.pause();
        deck.seek(30.0);
        let state = deck.state();
        assert!(!state.is_playing);
        assert_eq!(state.position, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_and_pause() {
        let (loader, _) = scripted(0, LoadError::Decode(String::new()));
        let deck = deck_with(loader);
        deck.load_track(&track("t1")).await.unwrap();
        deck.seek(30.0);
        assert_eq!(deck.state().position, 30.0);
        deck.play().await.unwrap();
        deck.pause();
        assert!(!deck.state().is_playing);
    }
}
