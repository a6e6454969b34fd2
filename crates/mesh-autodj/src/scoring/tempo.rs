//! Tempo compatibility from the absolute BPM difference

use super::{CriterionScore, NEUTRAL_SCORE};

/// BPM difference within which `strict_bpm` keeps a candidate
pub const STRICT_BPM_WINDOW: f64 = 3.0;

/// (max difference, score), checked in order
const TEMPO_STEPS: [(f64, u32); 5] = [(0.0, 100), (2.0, 90), (5.0, 70), (10.0, 50), (20.0, 30)];
const TEMPO_FLOOR: u32 = 10;

/// Differences below this are treated as identical tempo
const SAME_BPM_EPSILON: f64 = 1e-6;

pub fn score(reference: Option<f64>, candidate: Option<f64>) -> CriterionScore {
    let (Some(from), Some(to)) = (reference, candidate) else {
        return CriterionScore::new(NEUTRAL_SCORE, "BPM data unavailable");
    };

    let diff = (to - from).abs();
    let value = TEMPO_STEPS
        .iter()
        .find(|(max, _)| diff <= max + SAME_BPM_EPSILON)
        .map(|&(_, score)| score)
        .unwrap_or(TEMPO_FLOOR);

    let reason = if diff <= SAME_BPM_EPSILON {
        format!("Same BPM ({:.0})", from)
    } else {
        format!("{:+.1} BPM", to - from)
    };
    CriterionScore::new(value, reason)
}

/// Whether a candidate survives the strict-BPM filter (unknown tempo passes)
pub fn within_strict_window(reference: Option<f64>, candidate: Option<f64>) -> bool {
    match (reference, candidate) {
        (Some(from), Some(to)) => (to - from).abs() <= STRICT_BPM_WINDOW,
        _ => true,
    }
}
