//! Per-chain effects used by transition automation
//!
//! Every effect exposes a single automation amount in 0.0-1.0 (0 = fully
//! dry). The transition runner writes amounts; the chain processes the
//! effects in order after the EQ.

mod delay;
mod filter;
mod reverb;

pub use delay::DelayEffect;
pub use filter::FilterEffect;
pub use reverb::ReverbEffect;

use serde::{Deserialize, Serialize};

use crate::types::StereoBuffer;

/// Effects a chain can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// High-pass sweep
    Filter,
    /// Tempo-synced echo
    Delay,
    Reverb,
}

impl EffectKind {
    pub const ALL: [EffectKind; 3] = [EffectKind::Filter, EffectKind::Delay, EffectKind::Reverb];

    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Filter => "filter",
            EffectKind::Delay => "delay",
            EffectKind::Reverb => "reverb",
        }
    }

    /// Construct the native implementation
    pub fn create(self, sample_rate: u32) -> Box<dyn Effect> {
        match self {
            EffectKind::Filter => Box::new(FilterEffect::new(sample_rate)),
            EffectKind::Delay => Box::new(DelayEffect::new(sample_rate)),
            EffectKind::Reverb => Box::new(ReverbEffect::new(sample_rate)),
        }
    }
}

/// An insert effect on a playback chain
pub trait Effect: Send {
    fn kind(&self) -> EffectKind;

    /// Process a stereo buffer in-place
    fn process(&mut self, buffer: &mut StereoBuffer);

    /// Set the automation amount (clamped to 0.0-1.0)
    fn set_amount(&mut self, amount: f32);

    fn amount(&self) -> f32;

    /// Tempo of the loaded track, for tempo-synced effects
    fn set_tempo(&mut self, _bpm: f64) {}

    /// Clear internal state (tails, filter memory)
    fn reset(&mut self);
}

/// Ordered effects of one chain
#[derive(Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    pub fn new(kinds: &[EffectKind], sample_rate: u32) -> Self {
        let mut effects: Vec<Box<dyn Effect>> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if effects.iter().all(|e| e.kind() != *kind) {
                effects.push(kind.create(sample_rate));
            }
        }
        Self { effects }
    }

    pub fn has(&self, kind: EffectKind) -> bool {
        self.effects.iter().any(|e| e.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<EffectKind> {
        self.effects.iter().map(|e| e.kind()).collect()
    }

    /// Returns false if the chain has no such effect
    pub fn set_amount(&mut self, kind: EffectKind, amount: f32) -> bool {
        match self.effects.iter_mut().find(|e| e.kind() == kind) {
            Some(effect) => {
                effect.set_amount(amount);
                true
            }
            None => false,
        }
    }

    pub fn amount(&self, kind: EffectKind) -> Option<f32> {
        self.effects.iter().find(|e| e.kind() == kind).map(|e| e.amount())
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        for effect in &mut self.effects {
            effect.set_tempo(bpm);
        }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for effect in &mut self.effects {
            if effect.amount() > 0.0 {
                effect.process(buffer);
            }
        }
    }

    /// Zero all amounts and clear state
    pub fn reset(&mut self) {
        for effect in &mut self.effects {
            effect.set_amount(0.0);
            effect.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_chain_dedups_and_reports_kinds() {
        let chain = EffectChain::new(
            &[EffectKind::Delay, EffectKind::Delay, EffectKind::Filter],
            48000,
        );
        assert_eq!(chain.kinds(), vec![EffectKind::Delay, EffectKind::Filter]);
        assert!(!chain.has(EffectKind::Reverb));
    }

    #[test]
    fn test_set_amount_on_missing_effect() {
        let mut chain = EffectChain::new(&[EffectKind::Filter], 48000);
        assert!(chain.set_amount(EffectKind::Filter, 0.5));
        assert!(!chain.set_amount(EffectKind::Reverb, 0.5));
        assert_eq!(chain.amount(EffectKind::Filter), Some(0.5));
        assert_eq!(chain.amount(EffectKind::Reverb), None);
    }

    #[test]
    fn test_zero_amount_is_transparent() {
        let mut chain = EffectChain::new(&EffectKind::ALL, 48000);
        let original = StereoBuffer::from_vec(vec![StereoSample::new(0.3, -0.2); 64]);
        let mut buffer = original.clone();
        chain.process(&mut buffer);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_reset_zeroes_amounts() {
        let mut chain = EffectChain::new(&EffectKind::ALL, 48000);
        for kind in EffectKind::ALL {
            chain.set_amount(kind, 0.8);
        }
        chain.reset();
        for kind in EffectKind::ALL {
            assert_eq!(chain.amount(kind), Some(0.0));
        }
    }
}
