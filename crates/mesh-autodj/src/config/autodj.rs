//! File-level Auto-DJ configuration
//!
//! Default location: ~/.config/mesh-autodj/config.yaml

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AutoDjSettings;
use crate::crossfader::CrossfadeCurve;
use crate::effect::EffectKind;
use crate::types::SAMPLE_RATE;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDjConfig {
    /// Initial preferences (the settings store may override them)
    pub settings: AutoDjSettings,
    pub engine: EngineConfig,
    pub deck: DeckConfig,
    pub crossfader: CrossfaderConfig,
    pub transition: TransitionConfig,
    pub monitor: MonitorConfig,
}

/// Mixing graph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frames rendered per engine block
    pub block_size: usize,
    /// Master bus volume (0.0 to 1.0)
    pub master_volume: f32,
    /// Master limiter ceiling in dBFS
    pub limiter_threshold_db: f32,
    /// Effects available on every chain; plans needing anything else
    /// degrade to a plain crossfade
    pub effects: Vec<EffectKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            block_size: 512,
            master_volume: 0.8,
            limiter_threshold_db: -1.0,
            effects: EffectKind::ALL.to_vec(),
        }
    }
}

impl EngineConfig {
    /// Wall-clock length of one engine block
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Deck loading behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    /// Total load attempts before giving up
    pub max_load_attempts: u32,
    /// Backoff after attempt n is n × this
    pub backoff_step_ms: u64,
    /// How long to wait for a source to report its metadata
    pub metadata_timeout_ms: u64,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            max_load_attempts: 3,
            backoff_step_ms: 1000,
            metadata_timeout_ms: 10_000,
        }
    }
}

impl DeckConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms * attempt as u64)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossfaderConfig {
    pub curve: CrossfadeCurve,
    /// Ramp update period (~60 Hz)
    pub tick_ms: u64,
}

impl Default for CrossfaderConfig {
    fn default() -> Self {
        Self {
            curve: CrossfadeCurve::ConstantPower,
            tick_ms: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Length of a planned transition
    pub duration_secs: f64,
    /// Length of a cut transition
    pub cut_duration_secs: f64,
    /// Automation lane update period
    pub automation_tick_ms: u64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            duration_secs: 8.0,
            cut_duration_secs: 2.0,
            automation_tick_ms: 100,
        }
    }
}

impl TransitionConfig {
    pub fn automation_tick(&self) -> Duration {
        Duration::from_millis(self.automation_tick_ms.max(1))
    }
}

/// Progress thresholds for the playback monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    /// Progress at which the next track is scored
    pub suggestion_threshold: f64,
    /// Progress at which the transition is prepared
    pub prepare_threshold: f64,
    /// Remaining time that also triggers preparation
    pub prepare_remaining_secs: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            suggestion_threshold: 0.5,
            prepare_threshold: 0.75,
            prepare_remaining_secs: 15.0,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
