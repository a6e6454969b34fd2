//! High-pass filter sweep
//!
//! Amount 0.0 leaves the signal untouched; 1.0 moves the one-pole high-pass
//! cutoff up to 5 kHz, thinning the track out of the mix.

use super::{Effect, EffectKind};
use crate::types::StereoBuffer;

const MIN_CUTOFF_HZ: f32 = 20.0;
const MAX_CUTOFF_HZ: f32 = 5000.0;

pub struct FilterEffect {
    sample_rate: f32,
    amount: f32,
    lp_state_l: f32,
    lp_state_r: f32,
}

impl FilterEffect {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            amount: 0.0,
            lp_state_l: 0.0,
            lp_state_r: 0.0,
        }
    }

    /// Current cutoff in Hz
    pub fn cutoff_hz(&self) -> f32 {
        MIN_CUTOFF_HZ + self.amount * (MAX_CUTOFF_HZ - MIN_CUTOFF_HZ)
    }

    fn coeff(&self) -> f32 {
        let rc = 1.0 / (2.0 * std::f32::consts::PI * self.cutoff_hz());
        let dt = 1.0 / self.sample_rate;
        dt / (rc + dt)
    }
}

impl Effect for FilterEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Filter
    }

    fn process(&mut self, buffer: &mut StereoBuffer) {
        let coeff = self.coeff();
        for sample in buffer.iter_mut() {
            // High-pass = input minus its low-passed copy
            self.lp_state_l += coeff * (sample.left - self.lp_state_l);
            self.lp_state_r += coeff * (sample.right - self.lp_state_r);
            sample.left -= self.lp_state_l;
            sample.right -= self.lp_state_r;
        }
    }

    fn set_amount(&mut self, amount: f32) {
        self.amount = amount.clamp(0.0, 1.0);
    }

    fn amount(&self) -> f32 {
        self.amount
    }

    fn reset(&mut self) {
        self.lp_state_l = 0.0;
        self.lp_state_r = 0.0;
    }
}
