//! Rate-conversion stage.
//!
//! Converts decoded audio to the device rate and applies playback speed in
//! the same pass: the ratio is `dst_rate / (src_rate * speed)`, so 2x speed
//! consumes source frames twice as fast. Pitch shifts with speed.

use std::sync::Arc;
use std::thread;

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::queue::{SampleQueue, Take, capacity_for};

#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input frames per resampler call.
    pub chunk_frames: usize,
    /// Output queue depth in seconds.
    pub buffer_seconds: f32,
}

/// Resample ratio (output frames per input frame) for a rate pair at `speed`.
pub fn ratio_for(src_rate: u32, dst_rate: u32, speed: f64) -> Result<f64> {
    if src_rate == 0 || dst_rate == 0 {
        return Err(anyhow!("invalid sample rates {src_rate} -> {dst_rate}"));
    }
    if !speed.is_finite() || speed <= 0.0 {
        return Err(anyhow!("invalid playback speed {speed}"));
    }
    Ok(dst_rate as f64 / (src_rate as f64 * speed))
}

/// Whether `ratio` is close enough to 1 to skip resampling.
pub fn is_passthrough(ratio: f64) -> bool {
    (ratio - 1.0).abs() < 1e-9
}

/// Output buffer length in samples for one chunk at `ratio`, with headroom.
fn output_len(chunk_frames: usize, channels: usize, ratio: f64) -> usize {
    let frames = (chunk_frames as f64 * ratio * 1.2).ceil() as usize + 16;
    frames * channels
}

/// Spawn a resampler reading `srcq` and writing a new queue at `dst_rate`.
///
/// The output queue closes once `srcq` is closed and drained, or on error.
pub fn start_resampler(
    srcq: Arc<SampleQueue>,
    channels: usize,
    dst_rate: u32,
    ratio: f64,
    cfg: ResampleConfig,
) -> Result<Arc<SampleQueue>> {
    let dstq = Arc::new(SampleQueue::new(
        channels,
        capacity_for(dst_rate, channels, cfg.buffer_seconds),
    ));

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let chunk = cfg.chunk_frames.max(1);

    let dstq_thread = dstq.clone();
    thread::spawn(move || {
        let mut resampler =
            match Async::<f32>::new_sinc(ratio, 1.1, &params, chunk, channels, FixedAsync::Input) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("resampler init error: {e:#}");
                    srcq.close();
                    dstq_thread.close();
                    return;
                }
            };

        let mut out = vec![0.0f32; output_len(chunk, channels, ratio)];
        let mut indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: None,
        };

        while let Some(block) = srcq.take(Take::Exact { frames: chunk }) {
            match run_chunk(&mut resampler, &block, &mut out, channels, chunk, &mut indexing, None) {
                Ok(produced) => dstq_thread.push(&out[..produced]),
                Err(e) => {
                    tracing::error!("resampler error: {e:#}");
                    srcq.close();
                    break;
                }
            }
            if dstq_thread.is_closed() {
                srcq.close();
                break;
            }
        }

        // Final partial chunk once the decoder has closed the queue.
        while let Some(tail) = srcq.take(Take::UpTo { max_frames: chunk }) {
            let frames = tail.len() / channels;
            if frames == 0 {
                continue;
            }
            let mut padded = tail;
            padded.resize(chunk * channels, 0.0);
            match run_chunk(
                &mut resampler,
                &padded,
                &mut out,
                channels,
                chunk,
                &mut indexing,
                Some(frames),
            ) {
                Ok(produced) if produced > 0 => dstq_thread.push(&out[..produced]),
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("resampler tail error: {e:#}");
                    break;
                }
            }
        }

        dstq_thread.close();
    });

    Ok(dstq)
}

/// Resample one chunk into `out`; returns the number of samples written.
fn run_chunk(
    resampler: &mut Async<f32>,
    input: &[f32],
    out: &mut [f32],
    channels: usize,
    chunk: usize,
    indexing: &mut Indexing,
    partial_len: Option<usize>,
) -> Result<usize> {
    let input_adapter = InterleavedSlice::new(input, channels, chunk)
        .map_err(|e| anyhow!("input buffer: {e}"))?;
    let out_frames = out.len() / channels;
    let mut output_adapter = InterleavedSlice::new_mut(out, channels, out_frames)
        .map_err(|e| anyhow!("output buffer: {e}"))?;

    indexing.input_offset = 0;
    indexing.output_offset = 0;
    indexing.partial_len = partial_len;

    let (_, produced_frames) =
        resampler.process_into_buffer(&input_adapter, &mut output_adapter, Some(&*indexing))?;
    Ok(produced_frames * channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_combines_rate_change_and_speed() {
        assert_eq!(ratio_for(48_000, 48_000, 1.0).unwrap(), 1.0);
        assert_eq!(ratio_for(48_000, 48_000, 2.0).unwrap(), 0.5);
        assert_eq!(ratio_for(44_100, 88_200, 0.5).unwrap(), 4.0);
    }

    #[test]
    fn ratio_rejects_bad_inputs() {
        assert!(ratio_for(0, 48_000, 1.0).is_err());
        assert!(ratio_for(48_000, 48_000, 0.0).is_err());
        assert!(ratio_for(48_000, 48_000, f64::NAN).is_err());
    }

    #[test]
    fn passthrough_only_at_unity() {
        assert!(is_passthrough(1.0));
        assert!(!is_passthrough(0.75));
    }

    #[test]
    fn output_buffer_grows_with_ratio() {
        let slow = output_len(1024, 2, 2.0);
        let fast = output_len(1024, 2, 0.5);
        assert!(slow > fast);
        assert!(slow >= 1024 * 2 * 2);
        assert_eq!(fast % 2, 0);
    }
}
