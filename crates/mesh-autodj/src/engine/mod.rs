//! Audio engine: context, mixing graph and output backends
//!
//! ```text
//! chain A: source → EQ → effects → gain ─┐
//!                                         ├→ master (volume → limiter → meter) → sink
//! chain B: source → EQ → effects → gain ─┘
//! ```

mod backend;
mod chain;
mod context;
mod eq;
mod graph;
mod master;
mod source;

pub use backend::{AudioBackend, ClockedBackend, NullSink, OutputSink, WavRecorder};
pub use chain::{Chain, DeckState};
pub use context::AudioEngine;
pub use eq::{EqBand, ThreeBandEq, EQ_KILL_DB, EQ_MAX_DB};
pub use graph::{MixGraph, SharedGraph};
pub use master::{Limiter, MasterBus, MeterReading};
pub use source::{DecodedAudio, TrackSource};
