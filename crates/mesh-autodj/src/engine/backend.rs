//! Output backends
//!
//! A backend pulls blocks from the [`MixGraph`](super::MixGraph) at the
//! engine's sample rate. [`ClockedBackend`] paces rendering on a tokio
//! interval and hands each block to an [`OutputSink`]: a WAV recorder
//! for recorded sets, or a null sink for headless runs and tests.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::graph::SharedGraph;
use crate::config::EngineConfig;
use crate::error::{PlayError, PlayResult};
use crate::types::StereoBuffer;

/// Where rendered audio goes
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin rendering. Called at most once per engine.
    fn start(&self, graph: SharedGraph, config: &EngineConfig) -> PlayResult<()>;

    /// Stop pulling blocks; the graph's transport freezes
    fn suspend(&self);

    fn resume(&self) -> PlayResult<()>;

    /// Stop rendering for good and release the output
    fn stop(&self);
}

/// Destination for rendered master blocks
pub trait OutputSink: Send {
    fn write(&mut self, block: &StereoBuffer) -> anyhow::Result<()>;

    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Discards audio
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&mut self, _block: &StereoBuffer) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records the master output to a 32-bit float stereo WAV file
pub struct WavRecorder {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl WavRecorder {
    pub fn create(path: &Path, sample_rate: u32) -> anyhow::Result<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file {:?}", path))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
        })
    }
}

impl OutputSink for WavRecorder {
    fn write(&mut self, block: &StereoBuffer) -> anyhow::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            anyhow::bail!("Recording to {:?} already finished", self.path);
        };
        for &sample in block.as_interleaved() {
            writer.write_sample(sample)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .with_context(|| format!("Failed to finalize WAV file {:?}", self.path))?;
            log::info!("WavRecorder: wrote {:?}", self.path);
        }
        Ok(())
    }
}

/// Renders on a tokio interval, one block per tick
pub struct ClockedBackend {
    sink: Mutex<Option<Box<dyn OutputSink>>>,
    suspended: Arc<AtomicBool>,
    stop: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClockedBackend {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
            suspended: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    /// Headless backend that renders into a [`NullSink`]
    pub fn null() -> Self {
        Self::new(Box::new(NullSink))
    }

    /// Whether the render task is still alive
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl AudioBackend for ClockedBackend {
    fn name(&self) -> &'static str {
        "clocked"
    }

    fn start(&self, graph: SharedGraph, config: &EngineConfig) -> PlayResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlayError::EngineStart(e.to_string()))?;
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| PlayError::EngineStart("backend already started".into()))?;

        let task = runtime.spawn(render_loop(
            graph,
            sink,
            config.clone(),
            Arc::clone(&self.suspended),
            Arc::clone(&self.stop),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    fn resume(&self) -> PlayResult<()> {
        if !self.is_running() {
            return Err(PlayError::EngineStart("render task is not running".into()));
        }
        self.suspended.store(false, Ordering::Release);
        Ok(())
    }

    fn stop(&self) {
        self.stop.notify_one();
    }
}

async fn render_loop(
    graph: SharedGraph,
    mut sink: Box<dyn OutputSink>,
    config: EngineConfig,
    suspended: Arc<AtomicBool>,
    stop: Arc<Notify>,
) {
    log::info!(
        "render: {} frames per block at {} Hz",
        config.block_size,
        config.sample_rate
    );
    let mut ticker = tokio::time::interval(config.block_duration());
    let mut block = StereoBuffer::silence(config.block_size);
    let mut sink_failed = false;

    loop {
        tokio::select! {
            _ = stop.notified() => break,
            _ = ticker.tick() => {
                if suspended.load(Ordering::Acquire) {
                    continue;
                }
                {
                    let mut graph = graph.lock().unwrap_or_else(PoisonError::into_inner);
                    let output = graph.render(config.block_size);
                    block.as_mut_slice().copy_from_slice(output.as_slice());
                }
                if sink_failed {
                    continue;
                }
                if let Err(e) = sink.write(&block) {
                    // Keep the transport running; only the output is lost
                    log::error!("render: output sink failed, discarding audio: {:#}", e);
                    sink_failed = true;
                }
            }
        }
    }

    if let Err(e) = sink.finish() {
        log::warn!("render: {:#}", e);
    }
    log::info!("render: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MixGraph;
    use std::time::Duration;

    fn config() -> EngineConfig {
        EngineConfig {
            sample_rate: 1000,
            block_size: 100,
            ..Default::default()
        }
    }

    /// Counts blocks written
    struct CountingSink(Arc<Mutex<usize>>);

    impl OutputSink for CountingSink {
        fn write(&mut self, _block: &StereoBuffer) -> anyhow::Result<()> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clocked_backend_renders_per_tick() {
        let blocks = Arc::new(Mutex::new(0));
        let backend = ClockedBackend::new(Box::new(CountingSink(Arc::clone(&blocks))));
        let graph: SharedGraph = Arc::new(Mutex::new(MixGraph::new(&config())));

        backend.start(Arc::clone(&graph), &config()).unwrap();
        tokio::time::sleep(Duration::from_millis(1050)).await;

        // First tick fires immediately, then one per 100 ms
        assert_eq!(*blocks.lock().unwrap(), 11);
        assert_eq!(graph.lock().unwrap().frames_rendered(), 1100);
        backend.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_freezes_rendering() {
        let backend = ClockedBackend::null();
        let graph: SharedGraph = Arc::new(Mutex::new(MixGraph::new(&config())));
        backend.start(Arc::clone(&graph), &config()).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        backend.suspend();
        let frozen = graph.lock().unwrap().frames_rendered();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(graph.lock().unwrap().frames_rendered(), frozen);

        backend.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(graph.lock().unwrap().frames_rendered() > frozen);
    }

    #[tokio::test]
    async fn test_second_start_fails() {
        let backend = ClockedBackend::null();
        let graph: SharedGraph = Arc::new(Mutex::new(MixGraph::new(&config())));
        backend.start(Arc::clone(&graph), &config()).unwrap();
        assert!(matches!(
            backend.start(graph, &config()),
            Err(PlayError::EngineStart(_))
        ));
        backend.stop();
    }

    #[test]
    fn test_wav_recorder_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.wav");
        let mut recorder = WavRecorder::create(&path, 1000).unwrap();
        recorder.write(&StereoBuffer::silence(250)).unwrap();
        recorder.finish().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 1000);
        assert_eq!(reader.duration(), 250);
        assert!(recorder.write(&StereoBuffer::silence(1)).is_err());
    }
}
