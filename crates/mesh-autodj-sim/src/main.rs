//! Mesh Auto-DJ simulator - runs a catalog through the Auto-DJ headless
//!
//! Plays the first catalog track on deck A and lets the Auto-DJ pick and
//! mix everything after it, logging each decision. Tracks without an audio
//! file play as silence for their catalog duration.
//!
//! ## Usage
//!
//! ```text
//! mesh-autodj-sim <catalog.yaml> [--config FILE] [--settings FILE]
//!                 [--record OUT.wav] [--duration SECS]
//! ```
//!
//! - `--config`: Auto-DJ config (default `~/.config/mesh-autodj/config.yaml`)
//! - `--settings`: persist preference changes to this file instead of
//!   keeping them in memory
//! - `--record`: write the master output to a WAV file
//! - `--duration`: stop after this many seconds (default 600)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use mesh_autodj::config::{default_config_path, load_config};
use mesh_autodj::deck::TrackLoader;
use mesh_autodj::engine::{AudioBackend, ClockedBackend, WavRecorder};
use mesh_autodj::services::{
    MemoryHistory, MemorySettingsStore, SettingsStore, StaticCatalog, TrackCatalog,
    YamlSettingsStore,
};
use mesh_autodj::{AutoDj, AutoDjConfig, AutoDjEvent, Collaborators, DeckId};

struct Args {
    catalog: PathBuf,
    config: PathBuf,
    settings: Option<PathBuf>,
    record: Option<PathBuf>,
    duration: Duration,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut catalog = None;
    let mut config = default_config_path();
    let mut settings = None;
    let mut record = None;
    let mut duration = Duration::from_secs(600);

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .with_context(|| format!("{} needs a value", flag))
        };
        match arg.as_str() {
            "--config" => config = PathBuf::from(value("--config")?),
            "--settings" => settings = Some(PathBuf::from(value("--settings")?)),
            "--record" => record = Some(PathBuf::from(value("--record")?)),
            "--duration" => {
                let secs: u64 = value("--duration")?
                    .parse()
                    .context("--duration must be whole seconds")?;
                duration = Duration::from_secs(secs);
            }
            flag if flag.starts_with("--") => bail!("Unknown flag {}", flag),
            path => catalog = Some(PathBuf::from(path)),
        }
    }

    Ok(Args {
        catalog: catalog.context("Usage: mesh-autodj-sim <catalog.yaml> [options]")?,
        config,
        settings,
        record,
        duration,
    })
}

fn log_event(event: &AutoDjEvent) {
    match event {
        AutoDjEvent::SuggestionReady { candidate } => log::info!(
            "Suggestion: {} ({}) - {}",
            candidate.track.display_name(),
            candidate.total,
            candidate.reason()
        ),
        AutoDjEvent::TransitionPrepared {
            to,
            track_id,
            archetype,
            ..
        } => log::info!("Prepared {} into '{}' on deck {}", archetype, track_id, to),
        AutoDjEvent::CandidateLoadFailed { track_id, error } => {
            log::warn!("Could not load '{}': {}", track_id, error)
        }
        AutoDjEvent::TransitionStarted { from, to, archetype } => {
            log::info!("{}: deck {} -> deck {}", archetype, from, to)
        }
        AutoDjEvent::TransitionCompleted { active } => log::info!("Deck {} is live", active),
        AutoDjEvent::TransitionAborted { reason } => log::info!("Transition aborted: {}", reason),
        AutoDjEvent::TrackEnded { deck, track_id } => {
            log::info!("'{}' ended on deck {}", track_id, deck)
        }
        AutoDjEvent::EnabledChanged { enabled } => log::info!("Auto-DJ enabled: {}", enabled),
    }
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config: AutoDjConfig = load_config(&args.config);
    let catalog = StaticCatalog::from_yaml_file(&args.catalog)?;
    let Some(first) = catalog.tracks().into_iter().next() else {
        bail!("Catalog {:?} has no tracks", args.catalog);
    };

    let settings: Arc<dyn SettingsStore> = match &args.settings {
        Some(path) => {
            let store = YamlSettingsStore::new(path);
            if !path.exists() {
                store.save(&config.settings)?;
            }
            Arc::new(store)
        }
        None => Arc::new(MemorySettingsStore::new(config.settings.clone())),
    };
    let backend: Box<dyn AudioBackend> = match &args.record {
        Some(path) => {
            log::info!("Recording master output to {:?}", path);
            let recorder = WavRecorder::create(path, config.engine.sample_rate)?;
            Box::new(ClockedBackend::new(Box::new(recorder)))
        }
        None => Box::new(ClockedBackend::null()),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        let (handle, task) = AutoDj::spawn(
            config,
            Collaborators {
                catalog: Arc::new(catalog),
                history: Arc::new(MemoryHistory::default()),
                settings,
                loader: Arc::new(TrackLoader),
                backend,
            },
        );
        let events = handle.subscribe();

        log::info!("Starting with '{}'", first.display_name());
        handle.play_track(DeckId::A, first).await?;

        let deadline = tokio::time::Instant::now() + args.duration;
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        while tokio::time::Instant::now() < deadline {
            tick.tick().await;
            for event in events.try_iter() {
                log_event(&event);
            }
            let meter = handle.meter();
            log::debug!("Master peak {:.3} rms {:.3}", meter.peak, meter.rms);
        }

        log::info!("Duration reached, shutting down");
        handle.shutdown().await?;
        task.await.context("Auto-DJ task panicked")?;
        Ok::<(), anyhow::Error>(())
    })
}
