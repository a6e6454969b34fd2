//! Tempo-synced stereo echo
//!
//! The delay time follows the loaded track's tempo (half a beat); the
//! automation amount is the wet level.

use super::{Effect, EffectKind};
use crate::types::StereoBuffer;

/// Maximum delay time in seconds
const MAX_DELAY_SECONDS: f32 = 2.0;
const FEEDBACK: f32 = 0.45;
/// Echo length in beats
const SYNC_BEATS: f32 = 0.5;
const DEFAULT_BPM: f64 = 120.0;

/// Stereo delay line
struct DelayLine {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
}

impl DelayLine {
    fn new(capacity: usize) -> Self {
        Self {
            buffer_l: vec![0.0; capacity],
            buffer_r: vec![0.0; capacity],
            write_pos: 0,
            delay_samples: capacity / 4,
        }
    }

    fn set_delay_samples(&mut self, samples: usize) {
        self.delay_samples = samples.clamp(1, self.buffer_l.len() - 1);
    }

    /// Read the delayed sample, write input plus feedback, advance
    #[inline]
    fn process(&mut self, left: f32, right: f32, feedback: f32) -> (f32, f32) {
        let len = self.buffer_l.len();
        let read_pos = (self.write_pos + len - self.delay_samples) % len;
        let (delayed_l, delayed_r) = (self.buffer_l[read_pos], self.buffer_r[read_pos]);

        self.buffer_l[self.write_pos] = left + delayed_l * feedback;
        self.buffer_r[self.write_pos] = right + delayed_r * feedback;
        self.write_pos = (self.write_pos + 1) % len;

        (delayed_l, delayed_r)
    }

    fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

pub struct DelayEffect {
    sample_rate: f32,
    delay_line: DelayLine,
    mix: f32,
}

impl DelayEffect {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        let capacity = ((sample_rate * MAX_DELAY_SECONDS) as usize).max(2);
        let mut effect = Self {
            sample_rate,
            delay_line: DelayLine::new(capacity),
            mix: 0.0,
        };
        effect.set_tempo(DEFAULT_BPM);
        effect
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_line.delay_samples
    }
}

/// Convert beats to milliseconds at given BPM
pub fn beats_to_ms(beats: f32, bpm: f64) -> f32 {
    beats * (60_000.0 / bpm as f32)
}

impl Effect for DelayEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }

    fn process(&mut self, buffer: &mut StereoBuffer) {
        let dry = 1.0 - self.mix * 0.5;
        for sample in buffer.iter_mut() {
            let (wet_l, wet_r) = self.delay_line.process(sample.left, sample.right, FEEDBACK);
            sample.left = sample.left * dry + wet_l * self.mix;
            sample.right = sample.right * dry + wet_r * self.mix;
        }
    }

    fn set_amount(&mut self, amount: f32) {
        self.mix = amount.clamp(0.0, 1.0);
    }

    fn amount(&self) -> f32 {
        self.mix
    }

    fn set_tempo(&mut self, bpm: f64) {
        let bpm = bpm.clamp(30.0, 300.0);
        let ms = beats_to_ms(SYNC_BEATS, bpm);
        let samples = (ms / 1000.0 * self.sample_rate) as usize;
        self.delay_line.set_delay_samples(samples);
    }

    fn reset(&mut self) {
        self.delay_line.reset();
    }
}
