//! Crossfader: position, gain curves and timed ramps
//!
//! Position runs from 0.0 (deck A only) to 1.0 (deck B only). The
//! crossfader is the only writer of the chains' crossfade gains.
//!
//! A ramp is a tokio task that moves the position toward one deck on a
//! fixed tick, driven by elapsed time rather than tick count. Any new
//! `set_position` or `crossfade` call cancels the running ramp.

use std::f32::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::CrossfaderConfig;
use crate::engine::AudioEngine;
use crate::types::DeckId;

/// How crossfader position maps to per-deck gain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossfadeCurve {
    Linear,
    /// Equal perceived loudness across the fade (A² + B² = 1)
    #[default]
    ConstantPower,
    /// Hard cut across the middle fifth of the travel
    FastCut,
}

impl CrossfadeCurve {
    /// `(gain_a, gain_b)` at `position`
    pub fn gains(self, position: f32) -> (f32, f32) {
        let p = position.clamp(0.0, 1.0);
        match self {
            CrossfadeCurve::Linear => (1.0 - p, p),
            CrossfadeCurve::ConstantPower => ((p * FRAC_PI_2).cos(), (p * FRAC_PI_2).sin()),
            CrossfadeCurve::FastCut => {
                let a = if p <= 0.4 {
                    1.0
                } else if p >= 0.6 {
                    0.0
                } else {
                    (0.6 - p) * 5.0
                };
                let b = if p >= 0.6 {
                    1.0
                } else if p <= 0.4 {
                    0.0
                } else {
                    (p - 0.4) * 5.0
                };
                (a, b)
            }
        }
    }
}

/// Deck a position favours (the centre counts as deck B)
pub fn deck_at(position: f32) -> DeckId {
    if position < 0.5 {
        DeckId::A
    } else {
        DeckId::B
    }
}

struct FaderState {
    position: f32,
    curve: CrossfadeCurve,
}

struct ActiveRamp {
    id: u64,
    task: JoinHandle<()>,
}

/// Observer for one ramp
///
/// Progress runs 0.0 to 1.0. The sender side is dropped when the ramp is
/// cancelled.
#[derive(Debug, Clone)]
pub struct RampHandle {
    id: u64,
    progress: watch::Receiver<f32>,
}

impl RampHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn progress(&self) -> f32 {
        *self.progress.borrow()
    }

    /// Wait for the ramp to end; true if it ran to completion
    pub async fn finished(&mut self) -> bool {
        loop {
            if *self.progress.borrow_and_update() >= 1.0 {
                return true;
            }
            if self.progress.changed().await.is_err() {
                return *self.progress.borrow() >= 1.0;
            }
        }
    }
}

pub struct Crossfader {
    engine: Arc<AudioEngine>,
    state: Arc<Mutex<FaderState>>,
    ramp: Mutex<Option<ActiveRamp>>,
    next_ramp_id: Mutex<u64>,
    tick: Duration,
}

impl Crossfader {
    /// Starts centred
    pub fn new(engine: Arc<AudioEngine>, config: &CrossfaderConfig) -> Self {
        let fader = Self {
            engine,
            state: Arc::new(Mutex::new(FaderState {
                position: 0.5,
                curve: config.curve,
            })),
            ramp: Mutex::new(None),
            next_ramp_id: Mutex::new(0),
            tick: Duration::from_millis(config.tick_ms.max(1)),
        };
        fader.apply_current();
        fader
    }

    pub fn position(&self) -> f32 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).position
    }

    pub fn curve(&self) -> CrossfadeCurve {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).curve
    }

    /// Current `(gain_a, gain_b)`
    pub fn gains(&self) -> (f32, f32) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.curve.gains(state.position)
    }

    pub fn set_curve(&self, curve: CrossfadeCurve) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).curve = curve;
        self.apply_current();
    }

    /// Jump to `position`, cancelling any ramp
    pub fn set_position(&self, position: f32) {
        self.cancel_ramp();
        apply(&self.engine, &self.state, position);
    }

    /// Ramp from the current position to the far side of `from`
    ///
    /// The starting gains are applied before this returns. A zero duration
    /// jumps straight to the end.
    pub fn crossfade(&self, from: DeckId, duration: Duration) -> RampHandle {
        self.cancel_ramp();
        let start = self.position();
        let end = from.other().crossfader_endpoint();
        let id = {
            let mut next = self.next_ramp_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };

        if duration.is_zero() {
            apply(&self.engine, &self.state, end);
            let (_tx, rx) = watch::channel(1.0);
            return RampHandle { id, progress: rx };
        }

        apply(&self.engine, &self.state, start);
        let (tx, rx) = watch::channel(0.0);
        log::debug!(
            "Crossfader: ramp {} {:.2} → {:.2} over {:.1}s",
            id,
            start,
            end,
            duration.as_secs_f32()
        );

        let engine = Arc::clone(&self.engine);
        let state = Arc::clone(&self.state);
        let tick = self.tick;
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(tick);
            loop {
                ticker.tick().await;
                let progress =
                    (started.elapsed().as_secs_f32() / duration.as_secs_f32()).min(1.0);
                apply(&engine, &state, start + (end - start) * progress);
                let _ = tx.send(progress);
                if progress >= 1.0 {
                    break;
                }
            }
        });

        *self.ramp.lock().unwrap_or_else(PoisonError::into_inner) = Some(ActiveRamp { id, task });
        RampHandle { id, progress: rx }
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|ramp| !ramp.task.is_finished())
    }

    /// Stop the running ramp where it is. Returns the cancelled ramp's id.
    pub fn cancel_ramp(&self) -> Option<u64> {
        let ramp = self.ramp.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        if ramp.task.is_finished() {
            return None;
        }
        ramp.task.abort();
        log::debug!("Crossfader: ramp {} cancelled", ramp.id);
        Some(ramp.id)
    }

    fn apply_current(&self) {
        let position = self.position();
        apply(&self.engine, &self.state, position);
    }
}

impl Drop for Crossfader {
    fn drop(&mut self) {
        self.cancel_ramp();
    }
}

fn apply(engine: &AudioEngine, state: &Mutex<FaderState>, position: f32) {
    let position = position.clamp(0.0, 1.0);
    let (gain_a, gain_b) = {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.position = position;
        state.curve.gains(position)
    };
    engine.with_graph(|graph| graph.set_crossfade_gains(gain_a, gain_b));
}
