//! User preferences read from the settings store

use serde::{Deserialize, Serialize};

/// Direction the set's energy should move in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyStyle {
    /// Small steps upward, track after track
    #[default]
    Gradual,
    /// Alternate between peaks and valleys
    PeakValley,
    /// Hold energy flat or let it drift down
    Chill,
}

impl std::fmt::Display for EnergyStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnergyStyle::Gradual => write!(f, "gradual"),
            EnergyStyle::PeakValley => write!(f, "peak-valley"),
            EnergyStyle::Chill => write!(f, "chill"),
        }
    }
}

/// Per-criterion weights for the total score (must sum to 100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub harmonic: u32,
    pub tempo: u32,
    pub energy: u32,
    pub recency: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            harmonic: 30,
            tempo: 30,
            energy: 25,
            recency: 15,
        }
    }
}

impl ScoreWeights {
    /// Weights used when the user turns off harmonic preference
    pub const TEMPO_BIASED: ScoreWeights = ScoreWeights {
        harmonic: 15,
        tempo: 45,
        energy: 25,
        recency: 15,
    };

    pub fn sum(&self) -> u32 {
        self.harmonic + self.tempo + self.energy + self.recency
    }

    pub fn is_valid(&self) -> bool {
        self.sum() == 100
    }
}

/// Auto-DJ preferences
///
/// This is the record exchanged with the settings store; the scorer and
/// the orchestrator read it, the presentation layer writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDjSettings {
    /// Whether the orchestrator acts on playback progress at all
    pub enabled: bool,
    /// Weight key compatibility over tempo
    pub prefer_harmonic: bool,
    /// Drop candidates more than 3 BPM away before scoring
    pub strict_bpm: bool,
    pub energy_style: EnergyStyle,
    /// Number of tracks after which a played track counts as fresh again
    pub recency_limit: u32,
    /// Weights applied when `prefer_harmonic` is on
    pub weights: ScoreWeights,
}

impl Default for AutoDjSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefer_harmonic: true,
            strict_bpm: false,
            energy_style: EnergyStyle::Gradual,
            recency_limit: 10,
            weights: ScoreWeights::default(),
        }
    }
}

impl AutoDjSettings {
    /// The weights the scorer should use right now
    ///
    /// Invalid user weights (not summing to 100) fall back to the defaults.
    pub fn effective_weights(&self) -> ScoreWeights {
        if !self.prefer_harmonic {
            return ScoreWeights::TEMPO_BIASED;
        }
        if self.weights.is_valid() {
            self.weights
        } else {
            log::warn!(
                "effective_weights: weights sum to {}, not 100; using defaults",
                self.weights.sum()
            );
            ScoreWeights::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_100() {
        assert!(ScoreWeights::default().is_valid());
        assert!(ScoreWeights::TEMPO_BIASED.is_valid());
    }

    #[test]
    fn test_effective_weights() {
        let mut settings = AutoDjSettings::default();
        assert_eq!(settings.effective_weights(), ScoreWeights::default());

        settings.prefer_harmonic = false;
        assert_eq!(settings.effective_weights(), ScoreWeights::TEMPO_BIASED);

        settings.prefer_harmonic = true;
        settings.weights.harmonic = 90;
        assert_eq!(settings.effective_weights(), ScoreWeights::default());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: AutoDjSettings =
            serde_yaml::from_str("energy_style: peak_valley\nstrict_bpm: true\n").unwrap();
        assert_eq!(settings.energy_style, EnergyStyle::PeakValley);
        assert!(settings.strict_bpm);
        assert_eq!(settings.recency_limit, 10);
        assert!(settings.enabled);
    }
}
