//! One playback chain: source → EQ → effects → channel gain
//!
//! The chain owns the transport for its deck. Position only moves while
//! blocks are rendered, so it always reflects what has actually been
//! played out.

use super::eq::{EqBand, ThreeBandEq};
use super::source::TrackSource;
use crate::effect::{EffectChain, EffectKind};
use crate::track::Track;
use crate::types::StereoBuffer;

/// Snapshot of one deck: what is loaded and where playback is
#[derive(Debug, Clone, PartialEq)]
pub struct DeckState {
    pub track: Option<Track>,
    /// Bumped on every load, including reloads of the same track
    pub load_id: u64,
    pub is_playing: bool,
    /// True once playback has reached the end of the source
    pub ended: bool,
    pub position: f64,
    pub duration: f64,
    pub volume: f32,
}

struct LoadedTrack {
    track: Track,
    source: TrackSource,
    /// Source length in engine frames
    end_frame: u64,
}

pub struct Chain {
    sample_rate: u32,
    loaded: Option<LoadedTrack>,
    load_id: u64,
    playing: bool,
    ended: bool,
    /// Playhead in engine frames
    frame: u64,
    /// Channel fader (0.0 to 1.0)
    volume: f32,
    /// Gain written by the crossfader
    crossfade_gain: f32,
    eq: ThreeBandEq,
    effects: EffectChain,
    output: StereoBuffer,
}

impl Chain {
    pub fn new(sample_rate: u32, effects: &[EffectKind]) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            loaded: None,
            load_id: 0,
            playing: false,
            ended: false,
            frame: 0,
            volume: 1.0,
            crossfade_gain: 1.0,
            eq: ThreeBandEq::new(sample_rate),
            effects: EffectChain::new(effects, sample_rate),
            output: StereoBuffer::default(),
        }
    }

    /// Replace the chain's source; playback stops at position 0
    pub fn load(&mut self, track: Track, source: TrackSource) {
        let end_frame = (source.duration() * self.sample_rate as f64).round() as u64;
        if let Some(bpm) = track.analysis.normalized().bpm {
            self.effects.set_tempo(bpm);
        }
        self.loaded = Some(LoadedTrack {
            track,
            source,
            end_frame,
        });
        self.load_id += 1;
        self.playing = false;
        self.ended = false;
        self.frame = 0;
    }

    pub fn unload(&mut self) {
        self.loaded = None;
        self.playing = false;
        self.ended = false;
        self.frame = 0;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn track(&self) -> Option<&Track> {
        self.loaded.as_ref().map(|l| &l.track)
    }

    /// Returns false when nothing is loaded
    pub fn start(&mut self) -> bool {
        if self.loaded.is_none() {
            return false;
        }
        self.playing = true;
        self.ended = false;
        true
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Move the playhead; clamped to the source length, no-op when empty
    pub fn seek(&mut self, seconds: f64) {
        let Some(loaded) = &self.loaded else {
            return;
        };
        let frame = (seconds.max(0.0) * self.sample_rate as f64).round() as u64;
        self.frame = frame.min(loaded.end_frame);
        self.ended = false;
    }

    pub fn position(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> f64 {
        self.loaded.as_ref().map_or(0.0, |l| l.source.duration())
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub(crate) fn set_crossfade_gain(&mut self, gain: f32) {
        self.crossfade_gain = gain.clamp(0.0, 1.0);
    }

    pub fn crossfade_gain(&self) -> f32 {
        self.crossfade_gain
    }

    pub fn set_eq_db(&mut self, band: EqBand, db: f32) {
        self.eq.set_gain_db(band, db);
    }

    pub fn eq_db(&self, band: EqBand) -> f32 {
        self.eq.gain_db(band)
    }

    pub fn has_effect(&self, kind: EffectKind) -> bool {
        self.effects.has(kind)
    }

    /// Returns false if the chain does not host `kind`
    pub fn set_effect_amount(&mut self, kind: EffectKind, amount: f32) -> bool {
        self.effects.set_amount(kind, amount)
    }

    pub fn effect_amount(&self, kind: EffectKind) -> Option<f32> {
        self.effects.amount(kind)
    }

    /// Flat EQ, all effects dry
    pub fn reset_automation(&mut self) {
        self.eq.reset();
        self.effects.reset();
    }

    pub fn snapshot(&self) -> DeckState {
        DeckState {
            track: self.track().cloned(),
            load_id: self.load_id,
            is_playing: self.playing,
            ended: self.ended,
            position: self.position(),
            duration: self.duration(),
            volume: self.volume,
        }
    }

    /// Render `frames` frames into the chain's output buffer
    pub(crate) fn render(&mut self, frames: usize) {
        self.output.resize(frames);
        self.output.fill_silence();

        if self.playing {
            if let Some(loaded) = &self.loaded {
                let rate = self.sample_rate as f64;
                for out in self.output.iter_mut() {
                    if self.frame >= loaded.end_frame {
                        break;
                    }
                    *out = loaded.source.sample_at(self.frame as f64 / rate);
                    self.frame += 1;
                }
                if self.frame >= loaded.end_frame {
                    self.playing = false;
                    self.ended = true;
                }
            }
        }

        // EQ and effect tails keep running while paused
        self.eq.process(&mut self.output);
        self.effects.process(&mut self.output);
        self.output.scale(self.volume * self.crossfade_gain);
    }

    pub(crate) fn output(&self) -> &StereoBuffer {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn chain() -> Chain {
        Chain::new(1000, &EffectKind::ALL)
    }

    #[test]
    fn test_render_advances_position_only_when_playing() {
        let mut chain = chain();
        chain.load(Track::new("t", "T"), TrackSource::silent(2.0));
        chain.render(500);
        assert_eq!(chain.position(), 0.0);

        assert!(chain.start());
        chain.render(500);
        assert_eq!(chain.position(), 0.5);
        chain.pause();
        chain.render(500);
        assert_eq!(chain.position(), 0.5);
    }

    #[test]
    fn test_playback_stops_at_end() {
        let mut chain = chain();
        chain.load(Track::new("t", "T"), TrackSource::silent(1.0));
        chain.start();
        chain.render(600);
        chain.render(600);
        let snapshot = chain.snapshot();
        assert!(snapshot.ended);
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.position, 1.0);
    }

    #[test]
    fn test_start_and_seek_on_empty_chain() {
        let mut chain = chain();
        assert!(!chain.start());
        chain.seek(10.0);
        assert_eq!(chain.position(), 0.0);
        assert!(!chain.snapshot().is_playing);
    }

    #[test]
    fn test_load_resets_transport_and_bumps_load_id() {
        let mut chain = chain();
        chain.load(Track::new("t", "T"), TrackSource::silent(5.0));
        chain.start();
        chain.render(1000);
        let first = chain.snapshot().load_id;

        chain.load(Track::new("t", "T"), TrackSource::silent(5.0));
        let snapshot = chain.snapshot();
        assert_eq!(snapshot.load_id, first + 1);
        assert_eq!(snapshot.position, 0.0);
        assert!(!snapshot.is_playing);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let mut chain = chain();
        chain.load(Track::new("t", "T"), TrackSource::silent(3.0));
        chain.seek(10.0);
        assert_eq!(chain.position(), 3.0);
        chain.seek(-1.0);
        assert_eq!(chain.position(), 0.0);
    }

    #[test]
    fn test_gain_staging() {
        let mut chain = chain();
        let audio = StereoBuffer::from_vec(vec![StereoSample::new(1.0, 1.0); 1000]);
        chain.load(Track::new("t", "T"), TrackSource::decoded(audio, 1000));
        chain.set_volume(0.5);
        chain.set_crossfade_gain(0.5);
        chain.start();
        chain.render(10);
        assert!((chain.output().peak() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_reset_automation() {
        let mut chain = chain();
        chain.set_eq_db(EqBand::Low, -24.0);
        chain.set_effect_amount(EffectKind::Reverb, 0.7);
        chain.reset_automation();
        assert_eq!(chain.eq_db(EqBand::Low), 0.0);
        assert_eq!(chain.effect_amount(EffectKind::Reverb), Some(0.0));
    }
}
