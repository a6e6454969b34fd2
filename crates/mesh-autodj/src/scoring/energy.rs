//! Directional energy scoring
//!
//! Each style defines a target delta from the reference energy. The score
//! falls linearly with the distance between the actual delta and that
//! target; `Chill` halves the penalty for going below the target so a
//! gentle drop outranks an equal-sized rise.

use super::{CriterionScore, NEUTRAL_SCORE};
use crate::config::EnergyStyle;
use crate::track::Energy;

/// Points lost per energy level away from the target delta
const POINTS_PER_LEVEL: f32 = 15.0;
const ENERGY_FLOOR: f32 = 10.0;

/// Level at or above which an unknown trend counts as a peak
const PEAK_LEVEL: f32 = 6.0;
const PEAK_VALLEY_SWING: f32 = 3.0;

/// Delta the style is aiming for from `reference`
///
/// `previous` is the energy of the track played before the reference; for
/// peak-valley it tells whether the reference sits on a peak or in a valley.
pub fn target_delta(style: EnergyStyle, reference: Energy, previous: Option<Energy>) -> f32 {
    match style {
        EnergyStyle::Gradual => 1.0,
        EnergyStyle::Chill => 0.0,
        EnergyStyle::PeakValley => {
            let at_peak = match previous {
                Some(prev) if prev.level() != reference.level() => reference.level() > prev.level(),
                _ => reference.level() >= PEAK_LEVEL,
            };
            if at_peak {
                -PEAK_VALLEY_SWING
            } else {
                PEAK_VALLEY_SWING
            }
        }
    }
}

pub fn score(
    style: EnergyStyle,
    reference: Option<Energy>,
    candidate: Option<Energy>,
    previous: Option<Energy>,
) -> CriterionScore {
    let (Some(from), Some(to)) = (reference, candidate) else {
        return CriterionScore::new(NEUTRAL_SCORE, "Energy data unavailable");
    };

    let delta = from.delta_to(&to);
    let target = target_delta(style, from, previous);
    let distance = match style {
        EnergyStyle::Chill if delta < target => (target - delta) * 0.5,
        _ => (delta - target).abs(),
    };

    let value = (100.0 - POINTS_PER_LEVEL * distance)
        .round()
        .clamp(ENERGY_FLOOR, 100.0) as u32;
    CriterionScore::new(value, describe(from, delta))
}

fn describe(reference: Energy, delta: f32) -> String {
    if delta.abs() < 0.5 {
        return format!("Steady energy (E{})", format_level(reference.level()));
    }
    let label = match delta {
        d if d > 2.0 => "Energy jump",
        d if d > 0.0 => "Gradual build",
        d if d >= -2.0 => "Gentle cool-down",
        _ => "Energy drop",
    };
    let sign = if delta > 0.0 { "+" } else { "-" };
    format!("{} ({}{})", label, sign, format_level(delta.abs()))
}

fn format_level(level: f32) -> String {
    if level.fract() == 0.0 {
        format!("{:.0}", level)
    } else {
        format!("{:.1}", level)
    }
}
