//! The mixing graph: two playback chains into the master bus

use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use super::chain::Chain;
use super::master::{MasterBus, MeterReading};
use crate::config::EngineConfig;
use crate::types::{DeckId, PerDeck, StereoBuffer};

/// Graph shared between the render loop and the controllers
pub type SharedGraph = Arc<Mutex<MixGraph>>;

pub struct MixGraph {
    sample_rate: u32,
    chains: PerDeck<Chain>,
    master: MasterBus,
    output: StereoBuffer,
    frames_rendered: u64,
}

impl MixGraph {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            chains: PerDeck::from_fn(|_| Chain::new(config.sample_rate, &config.effects)),
            master: MasterBus::new(
                config.master_volume,
                config.limiter_threshold_db,
                config.sample_rate,
            ),
            output: StereoBuffer::silence(config.block_size),
            frames_rendered: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn chain(&self, deck: DeckId) -> &Chain {
        &self.chains[deck]
    }

    pub fn chain_mut(&mut self, deck: DeckId) -> &mut Chain {
        &mut self.chains[deck]
    }

    /// Crossfader output: per-chain gains for deck A and deck B
    pub fn set_crossfade_gains(&mut self, gain_a: f32, gain_b: f32) {
        self.chains[DeckId::A].set_crossfade_gain(gain_a);
        self.chains[DeckId::B].set_crossfade_gain(gain_b);
    }

    pub fn master(&self) -> &MasterBus {
        &self.master
    }

    pub fn meter(&self) -> MeterReading {
        self.master.meter()
    }

    /// Total frames rendered since the graph was built
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Render one block and return the master output
    pub fn render(&mut self, frames: usize) -> &StereoBuffer {
        // Chains are independent until the sum
        self.chains.0.par_iter_mut().for_each(|chain| chain.render(frames));

        self.output.resize(frames);
        self.output.fill_silence();
        for chain in &self.chains.0 {
            self.output.mix_in(chain.output(), 1.0);
        }
        self.master.process(&mut self.output);
        self.frames_rendered += frames as u64;
        &self.output
    }
}
