//! Background track loading
//!
//! Decoding happens entirely off the audio thread: the control layer
//! queues a `LoadRequest`, the loader thread decodes the source with
//! symphonia at its native rate, and the finished `LoadedTrack` comes back
//! on the result channel ready to splice onto a deck via
//! `EngineCommand::LoadTrack`. A deck's current playback is never touched
//! until the replacement is fully decoded.

use std::fs::File;
use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::EngineError;
use crate::track::{LoadedTrack, Track};
use crate::types::{DeckId, StereoBuffer, StereoSample};

/// Request to decode a track for a deck
#[derive(Debug)]
pub struct LoadRequest {
    pub deck: DeckId,
    pub track: Track,
}

/// Outcome of one load request
pub struct LoadResult {
    pub deck: DeckId,
    pub result: Result<Box<LoadedTrack>, EngineError>,
}

/// Background decoder for track audio
pub struct TrackLoader {
    request_tx: Sender<LoadRequest>,
    result_rx: Receiver<LoadResult>,
    _handle: JoinHandle<()>,
}

impl TrackLoader {
    /// Spawn the loader thread
    pub fn new() -> Self {
        let (request_tx, request_rx) = unbounded::<LoadRequest>();
        let (result_tx, result_rx) = unbounded::<LoadResult>();

        let handle = thread::Builder::new()
            .name("duodeck-loader".to_string())
            .spawn(move || {
                loader_thread(request_rx, result_tx);
            })
            .expect("failed to spawn track loader thread");

        Self {
            request_tx,
            result_rx,
            _handle: handle,
        }
    }

    /// Queue a track for decoding (non-blocking)
    pub fn load(&self, deck: DeckId, track: Track) {
        if self.request_tx.send(LoadRequest { deck, track }).is_err() {
            log::error!("track loader thread is gone");
        }
    }

    /// Receiver for finished loads, to drain from the control loop
    pub fn results(&self) -> &Receiver<LoadResult> {
        &self.result_rx
    }
}

impl Default for TrackLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn loader_thread(request_rx: Receiver<LoadRequest>, result_tx: Sender<LoadResult>) {
    log::info!("track loader thread started");
    while let Ok(request) = request_rx.recv() {
        let deck = request.deck;
        let result = decode_track(request.track).map(Box::new).map_err(|reason| {
            log::warn!("deck {}: load failed: {}", deck, reason);
            EngineError::Load { deck, reason }
        });

        if result_tx.send(LoadResult { deck, result }).is_err() {
            break;
        }
    }
}

/// Decode a track's source to a stereo buffer at its native rate
fn decode_track(track: Track) -> Result<LoadedTrack, String> {
    let (samples, sample_rate) = decode_file(&track.source_locator)?;
    log::info!(
        "decoded {:?}: {} samples at {} Hz",
        track.source_locator,
        samples.len(),
        sample_rate
    );
    Ok(LoadedTrack::new(track, samples, sample_rate))
}

fn decode_file(path: &Path) -> Result<(StereoBuffer, u32), String> {
    let file = File::open(path).map_err(|e| format!("cannot open source: {}", e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("unsupported format: {}", e))?;

    let mut format = probed.format;

    let audio_track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| "no audio track found".to_string())?;
    let track_id = audio_track.id;

    let sample_rate = audio_track
        .codec_params
        .sample_rate
        .ok_or_else(|| "unknown sample rate".to_string())?;
    let channels = audio_track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&audio_track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("unsupported codec: {}", e))?;

    let mut buffer = StereoBuffer::with_capacity(0);
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
                log::warn!("error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("error decoding packet: {}", e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(buf) = &mut sample_buf {
            buf.copy_interleaved_ref(decoded);
            append_as_stereo(&mut buffer, buf.samples(), channels);
        }
    }

    if buffer.is_empty() {
        return Err("decoded no audio".to_string());
    }
    Ok((buffer, sample_rate))
}

/// Append interleaved samples as stereo frames
///
/// Mono is duplicated to both channels; sources with more than two
/// channels keep their first two.
fn append_as_stereo(buffer: &mut StereoBuffer, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            for &v in interleaved {
                buffer.push(StereoSample::new(v, v));
            }
        }
        n => {
            for frame in interleaved.chunks_exact(n) {
                buffer.push(StereoSample::new(frame[0], frame[1]));
            }
        }
    }
}
