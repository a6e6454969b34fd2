//! Recency: how long ago a candidate was last played

use super::CriterionScore;
use crate::track::PlayHistoryEntry;

const FRESH_SCORE: u32 = 100;
/// Score for the most recently played track
const RECENCY_FLOOR: u32 = 0;

/// Score a candidate against history ordered most recent first
pub fn score(track_id: &str, history: &[PlayHistoryEntry], recency_limit: u32) -> CriterionScore {
    let Some(index) = history.iter().position(|entry| entry.track_id == track_id) else {
        return CriterionScore::new(FRESH_SCORE, "Never played");
    };

    let tracks_ago = index as u32 + 1;
    let limit = recency_limit.max(1);
    let reason = if tracks_ago == 1 {
        "Played last".to_string()
    } else {
        format!("Played {} tracks ago", tracks_ago)
    };

    if tracks_ago >= limit {
        return CriterionScore::new(FRESH_SCORE, reason);
    }

    // Linear from the floor at one track ago up to full score at the limit
    let span = FRESH_SCORE - RECENCY_FLOOR;
    let value = RECENCY_FLOOR + span * (tracks_ago - 1) / (limit - 1);
    CriterionScore::new(value, reason)
}
