//! Master bus: volume → lookahead limiter → analysis tap

use crate::types::StereoBuffer;

/// Ring buffer size; covers the lookahead at any sane sample rate
const MAX_LOOKAHEAD: usize = 1024;

/// Lookahead time in seconds (1.5 ms)
const LOOKAHEAD_SECS: f32 = 0.0015;

/// Release time-constant in seconds
const RELEASE_SECS: f32 = 0.1;

/// Feed-forward peak limiter
///
/// Input is delayed by the lookahead so gain reduction lands before the
/// peak does. Gain never exceeds unity.
pub struct Limiter {
    threshold: f32,
    lookahead: usize,
    delay: Vec<[f32; 2]>,
    targets: Vec<f32>,
    cursor: usize,
    gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl Limiter {
    pub fn new(threshold_db: f32, sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f32;
        let lookahead = ((LOOKAHEAD_SECS * sr).round() as usize).clamp(1, MAX_LOOKAHEAD - 1);
        Self {
            threshold: 10.0_f32.powf(threshold_db / 20.0),
            lookahead,
            delay: vec![[0.0; 2]; MAX_LOOKAHEAD],
            targets: vec![1.0; MAX_LOOKAHEAD],
            cursor: 0,
            gain: 1.0,
            // 99% of the way to the target within the lookahead window
            attack_coeff: (0.01_f32.ln() / lookahead as f32).exp(),
            release_coeff: (-1.0 / (RELEASE_SECS * sr)).exp(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn latency_samples(&self) -> usize {
        self.lookahead
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let peak = sample.peak();
            self.targets[self.cursor] = if peak > self.threshold {
                self.threshold / peak
            } else {
                1.0
            };

            let needed = (0..self.lookahead)
                .map(|i| self.targets[(self.cursor + MAX_LOOKAHEAD - i) % MAX_LOOKAHEAD])
                .fold(1.0_f32, f32::min);
            let coeff = if needed < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = self.gain * coeff + needed * (1.0 - coeff);

            let read = (self.cursor + MAX_LOOKAHEAD - self.lookahead) % MAX_LOOKAHEAD;
            let [left, right] = self.delay[read];
            self.delay[self.cursor] = [sample.left, sample.right];
            sample.left = left * self.gain;
            sample.right = right * self.gain;

            self.cursor = (self.cursor + 1) % MAX_LOOKAHEAD;
        }
    }
}

/// Level of the last rendered master block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterReading {
    pub peak: f32,
    pub rms: f32,
}

pub struct MasterBus {
    volume: f32,
    limiter: Limiter,
    meter: MeterReading,
}

impl MasterBus {
    pub fn new(volume: f32, limiter_threshold_db: f32, sample_rate: u32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            limiter: Limiter::new(limiter_threshold_db, sample_rate),
            meter: MeterReading::default(),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn meter(&self) -> MeterReading {
        self.meter
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        buffer.scale(self.volume);
        self.limiter.process(buffer);
        self.meter = MeterReading {
            peak: buffer.peak(),
            rms: buffer.rms(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn constant(level: f32, len: usize) -> StereoBuffer {
        StereoBuffer::from_vec(vec![StereoSample::new(level, -level); len])
    }

    #[test]
    fn test_limiter_transparent_below_threshold() {
        let mut limiter = Limiter::new(-1.0, 48000);
        let level = limiter.threshold() * 0.5;
        let mut buffer = constant(level, 256);
        limiter.process(&mut buffer);
        for sample in &buffer.as_slice()[limiter.latency_samples()..] {
            assert!((sample.left - level).abs() < 1e-6);
            assert!((sample.right + level).abs() < 1e-6);
        }
    }

    #[test]
    fn test_limiter_holds_hot_signal_under_ceiling() {
        let mut limiter = Limiter::new(-1.0, 48000);
        let threshold = limiter.threshold();
        let mut buffer = constant(threshold * 2.0, 4800);
        limiter.process(&mut buffer);
        let settled = &buffer.as_slice()[480..];
        assert!(settled.iter().all(|s| s.peak() <= threshold * 1.01));
    }

    #[test]
    fn test_master_bus_volume_and_meter() {
        let mut bus = MasterBus::new(0.8, -1.0, 48000);
        let mut buffer = constant(0.5, 512);
        bus.process(&mut buffer);
        let meter = bus.meter();
        assert!((meter.peak - 0.4).abs() < 1e-5);
        assert!(meter.rms > 0.0 && meter.rms <= meter.peak);
    }
}
