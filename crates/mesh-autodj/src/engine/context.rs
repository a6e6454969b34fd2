//! Audio engine context
//!
//! One [`AudioEngine`] exists per Auto-DJ instance. It owns the mixing
//! graph and the output backend. The backend is started lazily on the
//! first play request; concurrent first requests share a single start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use super::backend::AudioBackend;
use super::graph::{MixGraph, SharedGraph};
use crate::config::EngineConfig;
use crate::error::{PlayError, PlayResult};
use crate::types::DeckId;

pub struct AudioEngine {
    config: EngineConfig,
    graph: SharedGraph,
    backend: Box<dyn AudioBackend>,
    started: OnceCell<()>,
    suspended: AtomicBool,
    shut_down: AtomicBool,
}

impl AudioEngine {
    pub fn new(config: EngineConfig, backend: Box<dyn AudioBackend>) -> Self {
        let graph = Arc::new(Mutex::new(MixGraph::new(&config)));
        Self {
            config,
            graph,
            backend,
            started: OnceCell::new(),
            suspended: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Run `f` with exclusive access to the graph
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut MixGraph) -> R) -> R {
        let mut graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut graph)
    }

    pub fn is_started(&self) -> bool {
        self.started.initialized()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Start the backend if needed and resume it if suspended
    pub async fn ensure_running(&self) -> PlayResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PlayError::EngineStart("engine has been shut down".into()));
        }
        self.started
            .get_or_try_init(|| async {
                log::info!(
                    "AudioEngine: starting {} backend at {} Hz",
                    self.backend.name(),
                    self.config.sample_rate
                );
                self.backend.start(Arc::clone(&self.graph), &self.config)
            })
            .await?;

        if self.suspended.swap(false, Ordering::AcqRel) {
            log::info!("AudioEngine: resuming");
            if let Err(e) = self.backend.resume() {
                self.suspended.store(true, Ordering::Release);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Pause output; the next play request resumes it
    pub fn suspend(&self) {
        if self.is_started() && !self.suspended.swap(true, Ordering::AcqRel) {
            log::info!("AudioEngine: suspending");
            self.backend.suspend();
        }
    }

    /// Tear the backend down and empty both chains. Only done when the
    /// whole subsystem stops.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.is_started() {
            log::info!("AudioEngine: shutting down");
            self.backend.stop();
        }
        self.with_graph(|graph| {
            for deck in DeckId::ALL {
                graph.chain_mut(deck).unload();
            }
        });
    }
}
