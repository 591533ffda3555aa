//! Decode stage.
//!
//! Opens an episode source (local file or HTTP range reader), probes it with
//! Symphonia and streams interleaved `f32` samples into a bounded
//! [`SampleQueue`] from a background thread.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::http_stream::{HttpRangeConfig, HttpRangeSource};
use crate::queue::{SampleQueue, capacity_for};

/// Source facts learned while probing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceInfo {
    /// Duration in seconds, when the container reports frame count and rate.
    pub duration: Option<f64>,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
}

/// A running decode: its signal spec, output queue and failure slot.
pub struct DecodedStream {
    pub spec: SignalSpec,
    pub queue: Arc<SampleQueue>,
    pub info: SourceInfo,
    /// Set by the decode thread when it stops on an error rather than at end of stream.
    pub error: Arc<Mutex<Option<String>>>,
    /// The start offset was at or past the end; the queue is closed and empty.
    pub past_end: bool,
}

/// Where decoding begins once the reader has seeked.
#[derive(Debug, PartialEq)]
enum Start {
    /// Decode, dropping this many frames before the requested offset.
    Skip(u64),
    PastEnd,
}

/// `true` for http(s) locators.
pub fn is_remote(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Open `locator` as a Symphonia media source plus a format hint.
///
/// Remote reads return end of stream once `cancel` is raised.
pub fn open_source(
    locator: &str,
    mime: Option<&str>,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<(Box<dyn MediaSource>, Hint)> {
    let mut hint = Hint::new();
    if let Some(ext) = infer_extension(locator) {
        hint.with_extension(&ext);
    }
    if let Some(mime) = mime.filter(|m| !m.is_empty()) {
        hint.mime_type(mime);
    }

    if is_remote(locator) {
        let source = HttpRangeSource::new(locator.to_string(), HttpRangeConfig::default(), cancel);
        return Ok((Box::new(source), hint));
    }

    let path = Path::new(locator);
    let file = File::open(path).with_context(|| format!("open {path:?}"))?;
    Ok((Box::new(file), hint))
}

/// Probe a source for its duration and format without decoding audio.
pub fn probe(locator: &str, mime: Option<&str>) -> Result<SourceInfo> {
    let (source, hint) = open_source(locator, mime, None)?;
    let format = open_format(source, &hint)?;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default audio track"))?;
    Ok(source_info(&track.codec_params))
}

/// Start decoding `locator` at `start_secs` on a background thread.
///
/// The queue is closed on end of stream or error. An offset at or past the end
/// of the stream yields a closed, empty queue and no decode thread.
pub fn start_decode(
    locator: &str,
    mime: Option<&str>,
    buffer_seconds: f32,
    start_secs: f64,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<DecodedStream> {
    let (source, hint) = open_source(locator, mime, cancel)?;
    let mut format = open_format(source, &hint)?;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("unknown channel layout"))?;
    let rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("unknown sample rate"))?;
    let spec = SignalSpec::new(rate, channels);
    let info = source_info(&codec_params);

    let start = seek_start(format.as_mut(), track_id, start_secs, info.duration)?;

    let queue = Arc::new(SampleQueue::new(
        channels.count(),
        capacity_for(rate, channels.count(), buffer_seconds),
    ));
    let error = Arc::new(Mutex::new(None));

    let skip_frames = match start {
        Start::Skip(frames) => frames,
        Start::PastEnd => {
            tracing::debug!(start_secs, duration = ?info.duration, "start is past the end");
            queue.close();
            return Ok(DecodedStream {
                spec,
                queue,
                info,
                error,
                past_end: true,
            });
        }
    };

    let queue_thread = queue.clone();
    let error_thread = error.clone();
    thread::spawn(move || {
        if let Err(e) = decode_loop(format, &codec_params, track_id, skip_frames, &queue_thread) {
            tracing::error!("decoder thread error: {e:#}");
            if let Ok(mut slot) = error_thread.lock() {
                *slot = Some(format!("{e:#}"));
            }
        }
        queue_thread.close();
    });

    Ok(DecodedStream {
        spec,
        queue,
        info,
        error,
        past_end: false,
    })
}

fn seek_start(
    format: &mut dyn FormatReader,
    track_id: u32,
    start_secs: f64,
    duration: Option<f64>,
) -> Result<Start> {
    if start_secs <= 0.0 {
        return Ok(Start::Skip(0));
    }
    if duration.is_some_and(|d| start_secs >= d) {
        return Ok(Start::PastEnd);
    }
    let time = Time::new(start_secs.trunc() as u64, start_secs.fract());
    let seeked = format.seek(
        SeekMode::Accurate,
        SeekTo::Time {
            time,
            track_id: Some(track_id),
        },
    );
    match seeked {
        Ok(seeked) => Ok(Start::Skip(
            seeked.required_ts.saturating_sub(seeked.actual_ts),
        )),
        Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => Ok(Start::PastEnd),
        Err(e) => Err(e).with_context(|| format!("seek to {start_secs:.1}s")),
    }
}

fn open_format(source: Box<dyn MediaSource>, hint: &Hint) -> Result<Box<dyn FormatReader>> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("unsupported or unreadable audio source")?;
    Ok(probed.format)
}

fn decode_loop(
    mut format: Box<dyn FormatReader>,
    codec_params: &CodecParameters,
    track_id: u32,
    mut skip_frames: u64,
    queue: &SampleQueue,
) -> Result<()> {
    let mut decoder =
        symphonia::default::get_codecs().make(codec_params, &DecoderOptions::default())?;

    loop {
        if queue.is_closed() {
            return Ok(());
        }
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => return Ok(()),
            Err(e) => return Err(e).context("read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(e).context("decode packet"),
        };

        let channels = decoded.spec().channels.count();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);

        let mut samples = buf.samples();
        if skip_frames > 0 {
            let frames = (samples.len() / channels.max(1)) as u64;
            let drop_frames = skip_frames.min(frames);
            skip_frames -= drop_frames;
            samples = &samples[(drop_frames as usize * channels)..];
        }
        if !samples.is_empty() {
            queue.push(samples);
        }
    }
}

fn source_info(params: &CodecParameters) -> SourceInfo {
    SourceInfo {
        duration: duration_secs(params),
        codec: codec_name(params),
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
    }
}

/// Duration in seconds from frame count and sample rate.
fn duration_secs(params: &CodecParameters) -> Option<f64> {
    let frames = params.n_frames?;
    let rate = params.sample_rate?;
    if rate == 0 {
        return None;
    }
    Some(frames as f64 / rate as f64)
}

fn codec_name(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        _ => return None,
    };
    Some(name.to_string())
}

/// File extension from the last path segment of a URL or path, ignoring query strings.
pub fn infer_extension(locator: &str) -> Option<String> {
    let tail = locator.split(['?', '#']).next().unwrap_or(locator);
    let file = tail.rsplit(['/', '\\']).next().unwrap_or(tail);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Sample rate of [`write_ramp_wav`] files.
#[cfg(test)]
pub(crate) const RAMP_RATE: u32 = 8_000;

/// Write one second of 16-bit mono PCM where sample `i` holds the value `i`.
#[cfg(test)]
pub(crate) fn write_ramp_wav(name: &str) -> String {
    let path = std::env::temp_dir().join(format!(
        "podcast-player-{name}-{}.wav",
        std::process::id()
    ));
    let data_len = RAMP_RATE * 2;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&RAMP_RATE.to_le_bytes());
    bytes.extend_from_slice(&(RAMP_RATE * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..RAMP_RATE {
        bytes.extend_from_slice(&(i as i16).to_le_bytes());
    }
    std::fs::write(&path, bytes).expect("write test wav");
    path.to_string_lossy().into_owned()
}
