//! Transition planning
//!
//! Picks a transition archetype from the outgoing and incoming tracks'
//! analysis and lays out the automation (EQ and effect lanes) that runs
//! alongside the crossfader ramp.
//!
//! ```text
//! |Δenergy| ≥ 4                        → cut
//! tempo within 4 BPM and keys mix       → beat-matched (bass swap)
//! energy up by ≥ 2                      → filter sweep
//! energy down by ≥ 2                    → reverb tail
//! keys mix                              → echo out
//! otherwise                             → smooth blend
//! ```

mod automation;

pub use automation::{spawn_automation, AutomationLane, Keyframe, LaneRole, LaneTarget};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TransitionConfig;
use crate::deck::DeckController;
use crate::effect::EffectKind;
use crate::engine::{EqBand, EQ_KILL_DB};
use crate::track::{Track, TrackAnalysis};
use crate::types::DeckId;

/// Largest tempo gap still treated as beat-matchable
const BEAT_MATCH_BPM_WINDOW: f64 = 4.0;
/// Energy change (levels) that calls for a hard cut
const CUT_ENERGY_DELTA: f32 = 4.0;
/// Energy change (levels) that calls for a filter sweep or reverb tail
const SHIFT_ENERGY_DELTA: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Cut,
    BeatMatched,
    EchoOut,
    FilterSweep,
    ReverbTail,
    Smooth,
}

impl Archetype {
    pub fn name(&self) -> &'static str {
        match self {
            Archetype::Cut => "cut",
            Archetype::BeatMatched => "beat-matched",
            Archetype::EchoOut => "echo out",
            Archetype::FilterSweep => "filter sweep",
            Archetype::ReverbTail => "reverb tail",
            Archetype::Smooth => "smooth blend",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Choose an archetype for `current` → `next`
///
/// Unknown analysis never satisfies a condition, so tracks without data
/// get a smooth blend.
pub fn select_archetype(current: &TrackAnalysis, next: &TrackAnalysis) -> Archetype {
    let current = current.normalized();
    let next = next.normalized();

    let energy_delta = match (current.energy, next.energy) {
        (Some(from), Some(to)) => Some(from.delta_to(&to)),
        _ => None,
    };
    let tempo_close = match (current.bpm, next.bpm) {
        (Some(a), Some(b)) => (a - b).abs() <= BEAT_MATCH_BPM_WINDOW,
        _ => false,
    };
    let keys_mix = match (current.key, next.key) {
        (Some(a), Some(b)) => a.relation(&b).is_compatible(),
        _ => false,
    };

    match energy_delta {
        Some(delta) if delta.abs() >= CUT_ENERGY_DELTA => Archetype::Cut,
        _ if tempo_close && keys_mix => Archetype::BeatMatched,
        Some(delta) if delta >= SHIFT_ENERGY_DELTA => Archetype::FilterSweep,
        Some(delta) if delta <= -SHIFT_ENERGY_DELTA => Archetype::ReverbTail,
        _ if keys_mix => Archetype::EchoOut,
        _ => Archetype::Smooth,
    }
}

/// A concrete transition from one deck to the other
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub from: DeckId,
    pub to: DeckId,
    pub archetype: Archetype,
    pub duration: Duration,
    pub lanes: Vec<AutomationLane>,
}

impl TransitionPlan {
    /// Effects the lanes write to
    pub fn required_effects(&self) -> Vec<EffectKind> {
        let mut kinds = Vec::new();
        for lane in &self.lanes {
            if let LaneTarget::Effect(kind) = lane.target {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        kinds
    }

    /// Drop all automation if either chain lacks an effect the lanes need
    ///
    /// Returns false when the plan was reduced to a plain crossfade.
    pub fn fit_to_decks(&mut self, outgoing: &DeckController, incoming: &DeckController) -> bool {
        let missing: Vec<EffectKind> = self
            .required_effects()
            .into_iter()
            .filter(|kind| !outgoing.has_effect(*kind) || !incoming.has_effect(*kind))
            .collect();
        if missing.is_empty() {
            return true;
        }
        log::warn!(
            "TransitionPlan: {} needs unavailable effects {:?}; falling back to a plain crossfade",
            self.archetype,
            missing
        );
        self.lanes.clear();
        false
    }
}

pub struct TransitionPlanner {
    config: TransitionConfig,
}

impl TransitionPlanner {
    pub fn new(config: TransitionConfig) -> Self {
        Self { config }
    }

    pub fn generate_plan(&self, from: DeckId, current: &Track, next: &Track) -> TransitionPlan {
        let archetype = select_archetype(&current.analysis, &next.analysis);
        let secs = match archetype {
            Archetype::Cut => self.config.cut_duration_secs,
            _ => self.config.duration_secs,
        };

        let mut lanes = archetype_lanes(archetype);
        let lifts = matches!(
            (current.analysis.normalized().energy, next.analysis.normalized().energy),
            (Some(a), Some(b)) if a.delta_to(&b) >= SHIFT_ENERGY_DELTA
        );
        if lifts && archetype != Archetype::Cut {
            // Hold the incoming track back with a high-pass until the last stretch
            lanes.push(AutomationLane::new(
                LaneRole::Incoming,
                LaneTarget::Effect(EffectKind::Filter),
                &[(0.0, 0.5), (0.8, 0.5), (1.0, 0.0)],
            ));
        }

        log::info!(
            "TransitionPlanner: {} → {} as {} over {:.1}s ({} lanes)",
            current.id,
            next.id,
            archetype,
            secs,
            lanes.len()
        );
        TransitionPlan {
            from,
            to: from.other(),
            archetype,
            duration: Duration::from_secs_f64(secs.max(0.0)),
            lanes,
        }
    }
}

fn archetype_lanes(archetype: Archetype) -> Vec<AutomationLane> {
    use LaneRole::{Incoming, Outgoing};
    use LaneTarget::{Effect, Eq};

    match archetype {
        Archetype::Cut => Vec::new(),
        Archetype::BeatMatched => vec![
            AutomationLane::new(
                Outgoing,
                Eq(EqBand::Low),
                &[(0.0, 0.0), (0.25, -6.0), (0.5, -12.0), (0.75, -24.0), (1.0, EQ_KILL_DB)],
            ),
            AutomationLane::new(
                Incoming,
                Eq(EqBand::Low),
                &[(0.0, EQ_KILL_DB), (0.25, -24.0), (0.5, -12.0), (0.75, -6.0), (1.0, 0.0)],
            ),
        ],
        Archetype::EchoOut => vec![
            AutomationLane::new(
                Outgoing,
                Effect(EffectKind::Delay),
                &[(0.0, 0.0), (0.6, 0.3), (0.8, 0.6), (1.0, 0.0)],
            ),
            AutomationLane::new(Outgoing, Eq(EqBand::Low), &[(0.0, 0.0), (1.0, -24.0)]),
        ],
        Archetype::FilterSweep => vec![
            AutomationLane::new(
                Outgoing,
                Effect(EffectKind::Filter),
                &[(0.0, 0.0), (0.5, 0.4), (1.0, 1.0)],
            ),
            AutomationLane::new(
                Outgoing,
                Eq(EqBand::Low),
                &[(0.0, 0.0), (0.5, -12.0), (1.0, EQ_KILL_DB)],
            ),
        ],
        Archetype::ReverbTail => {
            let tail = [(0.0, 0.0), (0.5, 0.4), (0.7, 0.7), (1.0, 0.0)];
            vec![
                AutomationLane::new(Outgoing, Effect(EffectKind::Reverb), &tail),
                AutomationLane::new(Incoming, Effect(EffectKind::Reverb), &tail),
            ]
        }
        Archetype::Smooth => vec![AutomationLane::new(
            Outgoing,
            Eq(EqBand::Low),
            &[(0.0, 0.0), (1.0, -12.0)],
        )],
    }
}
