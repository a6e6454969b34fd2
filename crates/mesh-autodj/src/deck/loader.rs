//! Track sources
//!
//! A [`SourceLoader`] turns a catalog [`Track`] into something a chain can
//! play. Each call to [`SourceLoader::open`] is one independent attempt;
//! retries and timeouts are the deck controller's business.

use std::fs::File;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::TrackSource;
use crate::error::{LoadError, LoadResult};
use crate::track::Track;
use crate::types::StereoBuffer;

pub type LoadFuture = Pin<Box<dyn Future<Output = LoadResult<TrackSource>> + Send>>;

pub trait SourceLoader: Send + Sync {
    fn open(&self, track: &Track) -> LoadFuture;
}

/// Default loader
///
/// File-backed tracks are decoded with symphonia on the blocking pool.
/// Tracks without a file play as silence for their catalog duration, which
/// keeps the transport and the Auto-DJ timeline intact for catalog-only
/// sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackLoader;

impl SourceLoader for TrackLoader {
    fn open(&self, track: &Track) -> LoadFuture {
        let track = track.clone();
        Box::pin(async move {
            match track.path {
                Some(path) => tokio::task::spawn_blocking(move || decode_file(&path))
                    .await
                    .map_err(|e| LoadError::Decode(e.to_string()))?,
                None if track.duration > 0.0 => Ok(TrackSource::silent(track.duration)),
                None => Err(LoadError::Unsupported(format!(
                    "track {} has no audio file and no duration",
                    track.id
                ))),
            }
        })
    }
}

/// Decode a whole file to stereo f32
fn decode_file(path: &Path) -> LoadResult<TrackSource> {
    let file = File::open(path)
        .map_err(|e| LoadError::Unreachable(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| LoadError::Unsupported(e.to_string()))?;
    let mut format = probed.format;

    let audio_track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::Unsupported("no audio track".into()))?;
    let track_id = audio_track.id;
    let sample_rate = audio_track
        .codec_params
        .sample_rate
        .ok_or_else(|| LoadError::Decode("unknown sample rate".into()))?;
    let channels = audio_track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&audio_track.codec_params, &DecoderOptions::default())
        .map_err(|e| LoadError::Unsupported(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("decode_file: {:?}: stopped reading: {}", path, e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("decode_file: {:?}: skipping packet: {}", path, e);
                continue;
            }
        };
        let buf = sample_buf
            .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
        buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buf.samples());
    }

    if interleaved.is_empty() {
        return Err(LoadError::Decode(format!("{}: no audio decoded", path.display())));
    }

    let samples = StereoBuffer::from_interleaved(&interleaved, channels);
    log::info!(
        "decode_file: {:?}: {} frames at {} Hz",
        path,
        samples.len(),
        sample_rate
    );
    Ok(TrackSource::decoded(samples, sample_rate))
}
