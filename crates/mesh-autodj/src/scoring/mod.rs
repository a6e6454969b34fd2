//! Compatibility scorer
//!
//! Ranks a candidate pool against the reference (currently playing) track
//! on four criteria and combines them with the configured weights:
//!
//! ```text
//! harmonic  Camelot relation            100 / 80 / 30, unknown 50
//! tempo     |ΔBPM| step table            100 .. 10,     unknown 50
//! energy    distance from style target   100 .. 10,     unknown 50
//! recency   tracks since last played     0 .. 100,      never played 100
//! ```
//!
//! Missing analysis never fails a candidate: every criterion falls back to
//! a neutral score. Inputs are normalized once on entry
//! ([`TrackAnalysis::normalized`]) so the criteria only deal with `Option`s.

pub mod energy;
pub mod harmonic;
pub mod recency;
pub mod tempo;

use crate::config::AutoDjSettings;
use crate::track::{Energy, PlayHistoryEntry, Track, TrackAnalysis};

/// Score given when a criterion has no data to judge by
pub const NEUTRAL_SCORE: u32 = 50;

/// One criterion's result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionScore {
    /// 0-100
    pub score: u32,
    pub reason: String,
}

impl CriterionScore {
    pub fn new(score: u32, reason: impl Into<String>) -> Self {
        Self {
            score,
            reason: reason.into(),
        }
    }
}

/// A ranked candidate with its breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub track: Track,
    /// Weighted total, 0-100
    pub total: u32,
    pub harmonic: CriterionScore,
    pub tempo: CriterionScore,
    pub energy: CriterionScore,
    pub recency: CriterionScore,
}

impl ScoredCandidate {
    /// All criterion reasons joined for display
    pub fn reason(&self) -> String {
        [&self.harmonic, &self.tempo, &self.energy, &self.recency]
            .iter()
            .map(|c| c.reason.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Rank `candidates` against `reference`, best first
///
/// `history` is ordered most recent first. Ties keep the candidates' input
/// order. The reference track itself is never suggested.
pub fn score(
    reference: &Track,
    candidates: &[Track],
    history: &[PlayHistoryEntry],
    settings: &AutoDjSettings,
) -> Vec<ScoredCandidate> {
    let weights = settings.effective_weights();
    let ref_analysis = reference.analysis.normalized();
    let previous_energy = previous_energy(reference, candidates, history);

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .filter(|candidate| candidate.id != reference.id)
        .filter_map(|candidate| {
            let analysis = candidate.analysis.normalized();
            if settings.strict_bpm && !tempo::within_strict_window(ref_analysis.bpm, analysis.bpm) {
                return None;
            }
            Some(score_one(
                candidate,
                &ref_analysis,
                &analysis,
                previous_energy,
                history,
                settings,
            ))
        })
        .map(|mut candidate| {
            let weighted = candidate.harmonic.score * weights.harmonic
                + candidate.tempo.score * weights.tempo
                + candidate.energy.score * weights.energy
                + candidate.recency.score * weights.recency;
            // Weights sum to 100: round the weighted mean half-up
            candidate.total = (weighted + 50) / 100;
            candidate
        })
        .collect();

    // Stable: equal totals keep input order
    scored.sort_by(|a, b| b.total.cmp(&a.total));
    scored
}

fn score_one(
    candidate: &Track,
    reference: &TrackAnalysis,
    analysis: &TrackAnalysis,
    previous_energy: Option<Energy>,
    history: &[PlayHistoryEntry],
    settings: &AutoDjSettings,
) -> ScoredCandidate {
    ScoredCandidate {
        track: candidate.clone(),
        total: 0,
        harmonic: harmonic::score(reference.key, analysis.key),
        tempo: tempo::score(reference.bpm, analysis.bpm),
        energy: energy::score(
            settings.energy_style,
            reference.energy,
            analysis.energy,
            previous_energy,
        ),
        recency: recency::score(&candidate.id, history, settings.recency_limit),
    }
}

/// Energy of the track played just before the reference, if known
fn previous_energy(
    reference: &Track,
    pool: &[Track],
    history: &[PlayHistoryEntry],
) -> Option<Energy> {
    let previous_id = match history.iter().position(|e| e.track_id == reference.id) {
        Some(index) => &history.get(index + 1)?.track_id,
        None => &history.first()?.track_id,
    };
    pool.iter()
        .find(|track| &track.id == previous_id)
        .and_then(|track| track.analysis.normalized().energy)
}

/// Best candidate whose energy is within one level of `level`
pub fn find_by_energy(
    level: u8,
    reference: &Track,
    candidates: &[Track],
    history: &[PlayHistoryEntry],
    settings: &AutoDjSettings,
) -> Option<ScoredCandidate> {
    let target = Energy::from_level(level).level();
    score(reference, candidates, history, settings)
        .into_iter()
        .find(|candidate| {
            candidate
                .track
                .analysis
                .normalized()
                .energy
                .is_some_and(|energy| (energy.level() - target).abs() <= 1.0)
        })
}
