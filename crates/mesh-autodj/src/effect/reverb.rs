//! Stereo reverb (parallel combs into series all-passes)
//!
//! The automation amount is the wet level; room size and damping are fixed
//! to a long, dark tail suited to washing out an outgoing track.

use super::{Effect, EffectKind};
use crate::types::StereoBuffer;

/// Comb lengths in samples at 44.1kHz
const COMB_LENGTHS: [usize; 4] = [1557, 1617, 1491, 1422];
const ALLPASS_LENGTHS: [usize; 2] = [556, 441];
/// Offset for the right channel to decorrelate the sides
const STEREO_SPREAD: usize = 23;

const ROOM_FEEDBACK: f32 = 0.84;
const DAMPING: f32 = 0.3;
const ALLPASS_FEEDBACK: f32 = 0.5;
/// Keeps the summed comb output near unity
const INPUT_GAIN: f32 = 0.015 * 4.0;

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * (1.0 - DAMPING) + self.filter_state * DAMPING;
        self.buffer[self.pos] = input + self.filter_state * ROOM_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        buffered - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// One side of the reverb
struct ReverbChannel {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl ReverbChannel {
    fn new(scale: f32, spread: usize) -> Self {
        let scaled = |len: usize| ((len + spread) as f32 * scale) as usize;
        Self {
            combs: COMB_LENGTHS.iter().map(|&l| CombFilter::new(scaled(l))).collect(),
            allpasses: ALLPASS_LENGTHS
                .iter()
                .map(|&l| AllpassFilter::new(scaled(l)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let input = input * INPUT_GAIN;
        let mut out: f32 = self.combs.iter_mut().map(|c| c.process(input)).sum();
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::reset);
        self.allpasses.iter_mut().for_each(AllpassFilter::reset);
    }
}

pub struct ReverbEffect {
    left: ReverbChannel,
    right: ReverbChannel,
    mix: f32,
}

impl ReverbEffect {
    pub fn new(sample_rate: u32) -> Self {
        let scale = sample_rate.max(1) as f32 / 44100.0;
        Self {
            left: ReverbChannel::new(scale, 0),
            right: ReverbChannel::new(scale, STEREO_SPREAD),
            mix: 0.0,
        }
    }
}

impl Effect for ReverbEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn process(&mut self, buffer: &mut StereoBuffer) {
        let dry = 1.0 - self.mix * 0.5;
        for sample in buffer.iter_mut() {
            let wet_l = self.left.process(sample.left);
            let wet_r = self.right.process(sample.right);
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

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_reverb_produces_tail() {
        let mut reverb = ReverbEffect::new(44100);
        reverb.set_amount(1.0);

        let mut samples = vec![StereoSample::silence(); 8000];
        samples[0] = StereoSample::new(1.0, 1.0);
        let mut buffer = StereoBuffer::from_vec(samples);
        reverb.process(&mut buffer);

        let tail = &buffer.as_slice()[2000..];
        assert!(tail.iter().any(|s| s.left.abs() > 1e-4));
        assert!(buffer.peak().is_finite());
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut reverb = ReverbEffect::new(44100);
        reverb.set_amount(1.0);
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::new(0.5, 0.5); 2000]);
        reverb.process(&mut buffer);

        reverb.reset();
        let mut silence = StereoBuffer::silence(4000);
        reverb.process(&mut silence);
        assert_eq!(silence.peak(), 0.0);
    }
}
