//! Mesh Auto-DJ - automatic next-track selection and dual-deck transitions
//!
//! The crate is layered bottom-up:
//!
//! - [`scoring`] ranks catalog tracks against the playing one
//! - [`engine`] renders two playback chains through a crossfader into a
//!   master bus
//! - [`deck`] loads tracks into chains and starts playback
//! - [`transition`] picks a transition archetype and runs its automation
//! - [`orchestrator`] watches progress and drives the whole cycle
//!
//! Hosts talk to a running Auto-DJ through [`AutoDjHandle`].

pub mod config;
pub mod crossfader;
pub mod deck;
pub mod effect;
pub mod engine;
pub mod error;
pub mod music;
pub mod orchestrator;
pub mod scoring;
pub mod services;
pub mod track;
pub mod transition;
pub mod types;

pub use config::{AutoDjConfig, AutoDjSettings, EnergyStyle};
pub use error::{LoadError, OrchestratorError, PlayError, TransitionAbort};
pub use orchestrator::{AutoDj, AutoDjEvent, AutoDjHandle, Collaborators, TransitionState};
pub use scoring::ScoredCandidate;
pub use track::{PlayHistoryEntry, Track, TrackAnalysis, TrackId};
pub use types::*;
