//! Track model and play history
//!
//! Analysis fields are optional: tracks arrive from the catalog with
//! whatever BPM/key/energy the analyser produced. Missing or nonsensical
//! values are resolved by [`TrackAnalysis::normalized`], which the scorer
//! applies to every input before computing sub-scores.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::music::CamelotKey;

pub type TrackId = String;

/// Lowest and highest BPM accepted as a real analysis result
const BPM_RANGE: std::ops::RangeInclusive<f64> = 20.0..=400.0;

/// Energy on the 0-10 level scale
///
/// Catalogs store energy either as an ordinal level 1-10 or normalized
/// 0.0-1.0; both map onto the same level scale here.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Energy(f32);

impl Energy {
    /// Ordinal level, clamped to 1-10
    pub fn from_level(level: u8) -> Self {
        Self(level.clamp(1, 10) as f32)
    }

    /// Normalized 0.0-1.0 value
    pub fn from_normalized(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0) * 10.0)
    }

    /// Level on the 0-10 scale (fractional for normalized inputs)
    pub fn level(&self) -> f32 {
        self.0
    }

    /// Signed level difference `other - self`
    pub fn delta_to(&self, other: &Energy) -> f32 {
        other.0 - self.0
    }

    fn is_valid(&self) -> bool {
        self.0.is_finite()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum EnergyRepr {
    Level(u8),
    Value(f64),
}

impl Serialize for Energy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.fract() == 0.0 && self.0 >= 1.0 {
            EnergyRepr::Level(self.0 as u8).serialize(serializer)
        } else {
            EnergyRepr::Value(f64::from(self.0 / 10.0)).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Energy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match EnergyRepr::deserialize(deserializer)? {
            EnergyRepr::Level(level) => Energy::from_level(level),
            // Values above 1.0 are fractional levels, not normalized energy
            EnergyRepr::Value(v) if v > 1.0 => Energy(v.min(10.0) as f32),
            EnergyRepr::Value(v) => Energy::from_normalized(v as f32),
        })
    }
}

/// Analysis results attached to a track before scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackAnalysis {
    pub bpm: Option<f64>,
    pub key: Option<CamelotKey>,
    pub energy: Option<Energy>,
}

impl TrackAnalysis {
    /// Drop values that cannot be real analysis results (zero/negative/NaN
    /// BPM, non-finite energy) so every criterion sees them as unknown
    pub fn normalized(&self) -> TrackAnalysis {
        TrackAnalysis {
            bpm: self.bpm.filter(|bpm| BPM_RANGE.contains(bpm)),
            key: self.key,
            energy: self.energy.filter(Energy::is_valid),
        }
    }

    /// True when no criterion has data to work with
    pub fn is_empty(&self) -> bool {
        self.bpm.is_none() && self.key.is_none() && self.energy.is_none()
    }
}

/// A catalog track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    /// Duration in seconds as reported by the catalog (0 if unknown)
    #[serde(default)]
    pub duration: f64,
    /// Audio file backing this track, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Category / genre tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub analysis: TrackAnalysis,
}

impl Track {
    pub fn new(id: impl Into<TrackId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: String::new(),
            duration: 0.0,
            path: None,
            category: None,
            analysis: TrackAnalysis::default(),
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.analysis.bpm = Some(bpm);
        self
    }

    /// Attach a key; unparseable strings leave the key unknown
    pub fn with_key(mut self, key: &str) -> Self {
        self.analysis.key = CamelotKey::parse(key);
        self
    }

    pub fn with_energy(mut self, level: u8) -> Self {
        self.analysis.energy = Some(Energy::from_level(level));
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// "Artist - Title", or just the title
    pub fn display_name(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.artist, self.title)
        }
    }
}

/// One entry of the play-history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayHistoryEntry {
    pub track_id: TrackId,
    pub timestamp: DateTime<Utc>,
    /// True when the Auto-DJ picked the track, false for user-locked picks
    pub auto_selected: bool,
}

impl PlayHistoryEntry {
    pub fn now(track_id: impl Into<TrackId>, auto_selected: bool) -> Self {
        Self {
            track_id: track_id.into(),
            timestamp: Utc::now(),
            auto_selected,
        }
    }
}
