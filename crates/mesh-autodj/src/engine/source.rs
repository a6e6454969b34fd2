//! Audio behind a loaded track

use std::sync::Arc;

use crate::types::{StereoBuffer, StereoSample};

/// Decoded PCM at its native sample rate
#[derive(Debug)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub samples: StereoBuffer,
}

/// What a playback chain reads from
///
/// Sources without decoded audio play silence for their duration; the
/// transport (position, end of track) behaves the same either way.
#[derive(Debug, Clone)]
pub struct TrackSource {
    duration: f64,
    audio: Option<Arc<DecodedAudio>>,
}

impl TrackSource {
    /// A source that only knows its length
    pub fn silent(duration: f64) -> Self {
        Self {
            duration: duration.max(0.0),
            audio: None,
        }
    }

    pub fn decoded(samples: StereoBuffer, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            duration: samples.len() as f64 / sample_rate as f64,
            audio: Some(Arc::new(DecodedAudio {
                sample_rate,
                samples,
            })),
        }
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_silent(&self) -> bool {
        self.audio.is_none()
    }

    /// Sample at `seconds`, linearly interpolated between source frames
    pub fn sample_at(&self, seconds: f64) -> StereoSample {
        let Some(audio) = &self.audio else {
            return StereoSample::silence();
        };
        let samples = audio.samples.as_slice();
        let pos = seconds * audio.sample_rate as f64;
        let index = pos.floor();
        if index < 0.0 || index as usize >= samples.len() {
            return StereoSample::silence();
        }
        let index = index as usize;
        let frac = (pos - index as f64) as f32;
        match samples.get(index + 1) {
            Some(next) => samples[index].lerp(next, frac),
            None => samples[index],
        }
    }
}
