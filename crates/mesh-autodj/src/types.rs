//! Common types for the Auto-DJ
//!
//! Stereo sample/buffer types shared by the mixing graph and the deck
//! identity used everywhere a per-deck value is stored.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Default engine sample rate (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Number of playback chains in the Auto-DJ mixing graph
pub const NUM_DECKS: usize = 2;

/// Audio sample type
pub type Sample = f32;

/// One of the two playback chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    /// Both decks in index order
    pub const ALL: [DeckId; NUM_DECKS] = [DeckId::A, DeckId::B];

    /// Array index for per-deck storage
    #[inline]
    pub fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }

    /// The other chain
    #[inline]
    pub fn other(self) -> DeckId {
        match self {
            DeckId::A => DeckId::B,
            DeckId::B => DeckId::A,
        }
    }

    /// Crossfader endpoint at which this deck is fully audible
    #[inline]
    pub fn crossfader_endpoint(self) -> f32 {
        match self {
            DeckId::A => 0.0,
            DeckId::B => 1.0,
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::A => write!(f, "A"),
            DeckId::B => write!(f, "B"),
        }
    }
}

/// Fixed pair of per-deck values indexed by [`DeckId`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerDeck<T>(pub [T; NUM_DECKS]);

impl<T> PerDeck<T> {
    pub fn from_fn(mut f: impl FnMut(DeckId) -> T) -> Self {
        Self([f(DeckId::A), f(DeckId::B)])
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeckId, &T)> {
        DeckId::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<DeckId> for PerDeck<T> {
    type Output = T;

    fn index(&self, deck: DeckId) -> &T {
        &self.0[deck.index()]
    }
}

impl<T> IndexMut<DeckId> for PerDeck<T> {
    fn index_mut(&mut self, deck: DeckId) -> &mut T {
        &mut self.0[deck.index()]
    }
}

/// A single stereo sample (left and right channels)
///
/// `#[repr(C)]` keeps the layout `[left, right]` so a buffer can be viewed
/// as interleaved f32 through bytemuck without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }

    /// Linear interpolation between two samples
    #[inline]
    pub fn lerp(&self, other: &Self, t: Sample) -> Self {
        Self {
            left: self.left + (other.left - self.left) * t,
            right: self.right + (other.right - self.right) * t,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples, downmixing or duplicating
    /// channels so the result is always stereo
    ///
    /// Beyond two channels, even-numbered channels are averaged into the
    /// left side and odd-numbered ones into the right.
    pub fn from_interleaved(interleaved: &[Sample], channels: usize) -> Self {
        let samples = match channels {
            0 => Vec::new(),
            1 => interleaved.iter().map(|&s| StereoSample::new(s, s)).collect(),
            2 => interleaved
                .chunks_exact(2)
                .map(|frame| StereoSample::new(frame[0], frame[1]))
                .collect(),
            n => interleaved.chunks_exact(n).map(downmix_frame).collect(),
        };
        Self { samples }
    }

    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Resize the buffer, filling with silence if growing
    pub fn resize(&mut self, new_len: usize) {
        self.samples.resize(new_len, StereoSample::silence());
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, StereoSample> {
        self.samples.iter_mut()
    }

    /// Zero-copy view of the samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Add another buffer scaled by `gain` into this one
    pub fn mix_in(&mut self, other: &StereoBuffer, gain: Sample) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src * gain;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Peak amplitude across the whole buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(StereoSample::peak).fold(0.0, f32::max)
    }

    /// RMS level of both channels combined
    pub fn rms(&self) -> Sample {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .samples
            .iter()
            .map(|s| s.left * s.left + s.right * s.right)
            .sum();
        (sum / (self.samples.len() * 2) as f32).sqrt()
    }
}

/// Fold one frame of three or more channels down to stereo
fn downmix_frame(frame: &[Sample]) -> StereoSample {
    let (mut left, mut right) = (0.0, 0.0);
    for (channel, &sample) in frame.iter().enumerate() {
        if channel % 2 == 0 {
            left += sample;
        } else {
            right += sample;
        }
    }
    let left_channels = frame.len().div_ceil(2) as Sample;
    let right_channels = (frame.len() / 2) as Sample;
    StereoSample::new(left / left_channels, right / right_channels)
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &StereoSample {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut StereoSample {
        &mut self.samples[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_id_other() {
        assert_eq!(DeckId::A.other(), DeckId::B);
        assert_eq!(DeckId::B.other(), DeckId::A);
        assert_eq!(DeckId::A.crossfader_endpoint(), 0.0);
        assert_eq!(DeckId::B.crossfader_endpoint(), 1.0);
    }

    #[test]
    fn test_per_deck_indexing() {
        let mut values = PerDeck::from_fn(|deck| deck.index() * 10);
        assert_eq!(values[DeckId::A], 0);
        assert_eq!(values[DeckId::B], 10);
        values[DeckId::B] = 7;
        assert_eq!(values.0, [0, 7]);
    }

    #[test]
    fn test_from_interleaved_mono_and_multichannel() {
        let mono = StereoBuffer::from_interleaved(&[0.5, -0.5], 1);
        assert_eq!(mono.len(), 2);
        assert_eq!(mono[1], StereoSample::new(-0.5, -0.5));

        let stereo = StereoBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 2);
        assert_eq!(stereo[1], StereoSample::new(0.3, 0.4));

        // Extra channels are folded in, not dropped
        let quad = StereoBuffer::from_interleaved(&[0.0, 0.0, 0.0, 0.0, 0.25, 0.5, 0.75, 1.0], 4);
        assert_eq!(quad.len(), 2);
        assert_eq!(quad[1], StereoSample::new(0.5, 0.75));

        let three = StereoBuffer::from_interleaved(&[0.5, 0.25, 1.0], 3);
        assert_eq!(three.len(), 1);
        assert_eq!(three[0], StereoSample::new(0.75, 0.25));
    }

    #[test]
    fn test_mix_in_and_levels() {
        let mut dst = StereoBuffer::silence(4);
        let src = StereoBuffer::from_vec(vec![StereoSample::new(1.0, -1.0); 4]);
        dst.mix_in(&src, 0.5);
        assert!((dst.peak() - 0.5).abs() < 1e-6);
        assert!((dst.rms() - 0.5).abs() < 1e-6);
        assert_eq!(dst.as_interleaved().len(), 8);
    }
}
