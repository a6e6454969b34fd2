//! Automation lanes and the task that plays them

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::TransitionPlan;
use crate::deck::DeckController;
use crate::effect::EffectKind;
use crate::engine::EqBand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneRole {
    Outgoing,
    Incoming,
}

/// Parameter a lane drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneTarget {
    /// EQ band gain in dB
    Eq(EqBand),
    /// Effect amount 0.0-1.0
    Effect(EffectKind),
}

/// Value at a point in the transition (0.0 = start, 1.0 = end)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub at: f32,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomationLane {
    pub role: LaneRole,
    pub target: LaneTarget,
    /// Sorted by `at`
    pub keyframes: Vec<Keyframe>,
}

impl AutomationLane {
    pub fn new(role: LaneRole, target: LaneTarget, points: &[(f32, f32)]) -> Self {
        let mut keyframes: Vec<Keyframe> = points
            .iter()
            .map(|&(at, value)| Keyframe { at, value })
            .collect();
        keyframes.sort_by(|a, b| a.at.total_cmp(&b.at));
        Self {
            role,
            target,
            keyframes,
        }
    }

    /// Linear interpolation between keyframes, held flat outside them
    pub fn value_at(&self, progress: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keyframes.first(), self.keyframes.last()) else {
            return 0.0;
        };
        if progress <= first.at {
            return first.value;
        }
        if progress >= last.at {
            return last.value;
        }
        for pair in self.keyframes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if progress <= b.at {
                let span = b.at - a.at;
                if span <= f32::EPSILON {
                    return b.value;
                }
                return a.value + (b.value - a.value) * (progress - a.at) / span;
            }
        }
        last.value
    }

    fn apply(&self, deck: &DeckController, progress: f32) {
        let value = self.value_at(progress);
        match self.target {
            LaneTarget::Eq(band) => deck.set_eq_db(band, value),
            LaneTarget::Effect(kind) => {
                deck.set_effect_amount(kind, value);
            }
        }
    }
}

fn apply_all(
    lanes: &[AutomationLane],
    outgoing: &DeckController,
    incoming: &DeckController,
    progress: f32,
) {
    for lane in lanes {
        let deck = match lane.role {
            LaneRole::Outgoing => outgoing,
            LaneRole::Incoming => incoming,
        };
        lane.apply(deck, progress);
    }
}

/// Run the plan's lanes over its duration
///
/// Start values are applied before this returns; the task then updates
/// every `tick` and finishes after writing the end values. Abort the
/// handle to cancel.
pub fn spawn_automation(
    plan: &TransitionPlan,
    outgoing: Arc<DeckController>,
    incoming: Arc<DeckController>,
    tick: Duration,
) -> JoinHandle<()> {
    let lanes = plan.lanes.clone();
    let duration = plan.duration;
    apply_all(&lanes, &outgoing, &incoming, 0.0);

    tokio::spawn(async move {
        if lanes.is_empty() {
            return;
        }
        let started = Instant::now();
        let mut ticker = tokio::time::interval(tick.max(Duration::from_millis(1)));
        loop {
            ticker.tick().await;
            let progress = if duration.is_zero() {
                1.0
            } else {
                (started.elapsed().as_secs_f32() / duration.as_secs_f32()).min(1.0)
            };
            apply_all(&lanes, &outgoing, &incoming, progress);
            if progress >= 1.0 {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeckConfig, EngineConfig, TransitionConfig};
    use crate::deck::TrackLoader;
    use crate::engine::{AudioEngine, ClockedBackend, EQ_KILL_DB};
    use crate::track::Track;
    use crate::transition::TransitionPlanner;
    use crate::types::DeckId;

    #[test]
    fn test_value_at_interpolates_and_holds() {
        let lane = AutomationLane::new(
            LaneRole::Outgoing,
            LaneTarget::Effect(EffectKind::Delay),
            &[(0.0, 0.0), (0.6, 0.3), (0.8, 0.6), (1.0, 0.0)],
        );
        assert_eq!(lane.value_at(-1.0), 0.0);
        assert!((lane.value_at(0.3) - 0.15).abs() < 1e-6);
        assert!((lane.value_at(0.7) - 0.45).abs() < 1e-6);
        assert_eq!(lane.value_at(0.8), 0.6);
        assert_eq!(lane.value_at(2.0), 0.0);
    }

    #[test]
    fn test_unsorted_points_are_sorted() {
        let lane = AutomationLane::new(
            LaneRole::Incoming,
            LaneTarget::Eq(EqBand::Low),
            &[(1.0, 0.0), (0.0, -24.0)],
        );
        assert_eq!(lane.keyframes[0].at, 0.0);
        assert_eq!(lane.value_at(0.5), -12.0);
    }

    fn decks(effects: Vec<EffectKind>) -> (Arc<DeckController>, Arc<DeckController>) {
        let config = EngineConfig {
            sample_rate: 1000,
            block_size: 100,
            effects,
            ..Default::default()
        };
        let engine = Arc::new(AudioEngine::new(config, Box::new(ClockedBackend::null())));
        let deck = |id| {
            Arc::new(DeckController::new(
                id,
                Arc::clone(&engine),
                Arc::new(TrackLoader),
                DeckConfig::default(),
            ))
        };
        (deck(DeckId::A), deck(DeckId::B))
    }

    #[tokio::test(start_paused = true)]
    async fn test_bass_swap_runs_to_completion() {
        let (outgoing, incoming) = decks(EffectKind::ALL.to_vec());
        let planner = TransitionPlanner::new(TransitionConfig::default());
        let current = Track::new("a", "A").with_bpm(128.0).with_key("8A").with_energy(6);
        let next = Track::new("b", "B").with_bpm(128.0).with_key("8A").with_energy(6);
        let plan = planner.generate_plan(DeckId::A, &current, &next);

        let task = spawn_automation(
            &plan,
            Arc::clone(&outgoing),
            Arc::clone(&incoming),
            Duration::from_millis(100),
        );
        // Incoming bass is killed before any audio is heard
        assert_eq!(incoming.eq_db(EqBand::Low), EQ_KILL_DB);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!((outgoing.eq_db(EqBand::Low) + 12.0).abs() < 0.5);

        task.await.unwrap();
        assert_eq!(outgoing.eq_db(EqBand::Low), EQ_KILL_DB);
        assert_eq!(incoming.eq_db(EqBand::Low), 0.0);
    }

    #[tokio::test]
    async fn test_missing_effect_degrades_to_crossfade() {
        let (outgoing, incoming) = decks(vec![EffectKind::Filter]);
        let planner = TransitionPlanner::new(TransitionConfig::default());
        let current = Track::new("a", "A").with_energy(7);
        let next = Track::new("b", "B").with_energy(5);
        let mut plan = planner.generate_plan(DeckId::A, &current, &next);
        assert_eq!(plan.required_effects(), vec![EffectKind::Reverb]);

        assert!(!plan.fit_to_decks(&outgoing, &incoming));
        assert!(plan.lanes.is_empty());
        assert_eq!(plan.duration, Duration::from_secs(8));
    }
}
