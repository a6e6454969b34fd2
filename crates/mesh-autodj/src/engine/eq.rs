//! 3-band channel equalizer (low shelf, mid peak, high shelf)
//!
//! Gains are set in dB. Anything at or below [`EQ_KILL_DB`] is a kill.

use serde::{Deserialize, Serialize};

use crate::types::StereoBuffer;

/// Gain treated as a full band kill
pub const EQ_KILL_DB: f32 = -60.0;
/// Maximum boost
pub const EQ_MAX_DB: f32 = 6.0;

const EQ_LO_FREQ: f32 = 100.0; // Low shelf at 100 Hz
const EQ_MID_FREQ: f32 = 1000.0; // Mid peak at 1 kHz
const EQ_HI_FREQ: f32 = 10000.0; // High shelf at 10 kHz
const EQ_MID_Q: f32 = 0.7;

/// Below this a band is left as passthrough
const FLAT_THRESHOLD_DB: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];

    fn index(self) -> usize {
        match self {
            EqBand::Low => 0,
            EqBand::Mid => 1,
            EqBand::High => 2,
        }
    }
}

/// Biquad filter state
#[derive(Debug, Clone, Default)]
struct BiquadState {
    x1_l: f32, x2_l: f32, y1_l: f32, y2_l: f32,
    x1_r: f32, x2_r: f32, y1_r: f32, y2_r: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input_l: f32, input_r: f32, c: &BiquadCoeffs) -> (f32, f32) {
        let out_l = c.b0 * input_l + c.b1 * self.x1_l + c.b2 * self.x2_l
            - c.a1 * self.y1_l - c.a2 * self.y2_l;
        self.x2_l = self.x1_l;
        self.x1_l = input_l;
        self.y2_l = self.y1_l;
        self.y1_l = out_l;

        let out_r = c.b0 * input_r + c.b1 * self.x1_r + c.b2 * self.x2_r
            - c.a1 * self.y1_r - c.a2 * self.y2_r;
        self.x2_r = self.x1_r;
        self.x1_r = input_r;
        self.y2_r = self.y1_r;
        self.y1_r = out_r;

        (out_l, out_r)
    }
}

/// Biquad filter coefficients (RBJ cookbook)
#[derive(Debug, Clone, PartialEq)]
struct BiquadCoeffs {
    b0: f32, b1: f32, b2: f32,
    a1: f32, a2: f32,
}

impl BiquadCoeffs {
    fn shelf_alpha(sin_w0: f32, a: f32) -> f32 {
        sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt()
    }

    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = Self::shelf_alpha(sin_w0, a);

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = Self::shelf_alpha(sin_w0, a);

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }
}

/// Equalizer for one playback chain
#[derive(Debug, Clone)]
pub struct ThreeBandEq {
    sample_rate: f32,
    gains_db: [f32; 3],
    states: [BiquadState; 3],
    coeffs: [BiquadCoeffs; 3],
    dirty: bool,
}

impl ThreeBandEq {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            gains_db: [0.0; 3],
            states: Default::default(),
            coeffs: [
                BiquadCoeffs::passthrough(),
                BiquadCoeffs::passthrough(),
                BiquadCoeffs::passthrough(),
            ],
            dirty: false,
        }
    }

    /// Set a band's gain in dB (clamped to kill..+6 dB)
    pub fn set_gain_db(&mut self, band: EqBand, db: f32) {
        let db = db.clamp(EQ_KILL_DB, EQ_MAX_DB);
        if self.gains_db[band.index()] != db {
            self.gains_db[band.index()] = db;
            self.dirty = true;
        }
    }

    pub fn gain_db(&self, band: EqBand) -> f32 {
        self.gains_db[band.index()]
    }

    pub fn is_flat(&self) -> bool {
        self.gains_db.iter().all(|db| db.abs() <= FLAT_THRESHOLD_DB)
    }

    /// Back to flat and clear filter memory
    pub fn reset(&mut self) {
        for band in EqBand::ALL {
            self.set_gain_db(band, 0.0);
        }
        self.states = Default::default();
    }

    fn update_coeffs(&mut self) {
        if !self.dirty {
            return;
        }
        let sr = self.sample_rate;
        for band in EqBand::ALL {
            let db = self.gains_db[band.index()];
            self.coeffs[band.index()] = if db.abs() <= FLAT_THRESHOLD_DB {
                BiquadCoeffs::passthrough()
            } else {
                match band {
                    EqBand::Low => BiquadCoeffs::low_shelf(EQ_LO_FREQ, db, sr),
                    EqBand::Mid => BiquadCoeffs::peaking(EQ_MID_FREQ, db, EQ_MID_Q, sr),
                    // Keep the shelf below Nyquist at low engine rates
                    EqBand::High => BiquadCoeffs::high_shelf(EQ_HI_FREQ.min(sr * 0.4), db, sr),
                }
            };
        }
        self.dirty = false;
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        self.update_coeffs();
        if self.is_flat() {
            return;
        }
        for sample in buffer.iter_mut() {
            let (mut left, mut right) = (sample.left, sample.right);
            for (state, coeffs) in self.states.iter_mut().zip(self.coeffs.iter()) {
                (left, right) = state.process(left, right, coeffs);
            }
            sample.left = left;
            sample.right = right;
        }
    }
}
