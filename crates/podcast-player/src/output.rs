//! Output stage (CPAL stream).
//!
//! The real-time callback pulls interleaved samples from the last queue
//! without blocking, maps channels to the device layout, applies gain and
//! converts to the device sample format. While paused it writes silence and
//! leaves the queue untouched.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::{SampleQueue, Take};

/// Output level shared by every session of one backend.
///
/// The level is stored in whole percent so the callback reads a single byte.
#[derive(Debug)]
pub struct VolumeControl {
    percent: AtomicU8,
    muted: AtomicBool,
}

impl VolumeControl {
    pub fn new(volume: f32, muted: bool) -> Self {
        Self {
            percent: AtomicU8::new(to_percent(volume)),
            muted: AtomicBool::new(muted),
        }
    }

    pub fn set_volume(&self, volume: f32) {
        self.percent.store(to_percent(volume), Ordering::Relaxed);
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        self.percent.load(Ordering::Relaxed) as f32 / 100.0
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Linear gain applied to samples: zero while muted.
    pub fn gain(&self) -> f32 {
        if self.muted() { 0.0 } else { self.volume() }
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(1.0, false)
    }
}

fn to_percent(volume: f32) -> u8 {
    if !volume.is_finite() {
        return 0;
    }
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Flags and counters shared between a session and its output callback.
#[derive(Clone)]
pub struct OutputControls {
    pub refill_max_frames: usize,
    /// Silence without draining while set.
    pub paused: Arc<AtomicBool>,
    /// Device frames written from real audio.
    pub played_frames: Arc<AtomicU64>,
    pub volume: Arc<VolumeControl>,
    /// Raised by the stream error callback.
    pub failed: Arc<AtomicBool>,
    /// Raised together with `failed` so the session stops waiting.
    pub cancel: Arc<AtomicBool>,
}

/// Build (but do not start) an output stream fed from `queue`.
///
/// `queue` must already be at the device sample rate.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    controls: OutputControls,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, controls),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, controls),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, controls),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, controls),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    controls: OutputControls,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let dst_channels = config.channels as usize;
    let pending = Mutex::new(Pending {
        pos: 0,
        src_channels: queue.channels(),
        samples: Vec::new(),
    });
    let queue = queue.clone();
    let refill = controls.refill_max_frames.max(1);

    let failed = controls.failed.clone();
    let cancel = controls.cancel.clone();
    let err_fn = move |err| {
        tracing::warn!("output stream error: {err}");
        failed.store(true, Ordering::Relaxed);
        cancel.store(true, Ordering::Relaxed);
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
            if controls.paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }
            let Ok(mut st) = pending.lock() else {
                data.fill(silence);
                return;
            };

            let gain = controls.volume.gain();
            let frames = data.len() / dst_channels;
            let mut written = 0u64;
            for frame in 0..frames {
                if st.exhausted() {
                    match queue.take(Take::Available { max_frames: refill }) {
                        Some(v) => {
                            st.samples = v;
                            st.pos = 0;
                        }
                        None => {
                            data[frame * dst_channels..].fill(silence);
                            break;
                        }
                    }
                }
                let out = &mut data[frame * dst_channels..(frame + 1) * dst_channels];
                for (ch, slot) in out.iter_mut().enumerate() {
                    let s = st.sample_for(ch, dst_channels) * gain;
                    *slot = <T as cpal::Sample>::from_sample::<f32>(s);
                }
                st.advance();
                written += 1;
            }
            if written > 0 {
                controls.played_frames.fetch_add(written, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Samples taken from the queue but not yet written to the device.
struct Pending {
    pos: usize,
    src_channels: usize,
    samples: Vec<f32>,
}

impl Pending {
    fn exhausted(&self) -> bool {
        self.pos >= self.samples.len()
    }

    fn advance(&mut self) {
        self.pos += self.src_channels.max(1);
    }

    fn src(&self, ch: usize) -> f32 {
        if ch < self.src_channels {
            self.samples.get(self.pos + ch).copied().unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Sample for device channel `dst_ch` from the current source frame.
    ///
    /// Mono is duplicated, stereo is averaged down to mono, wider layouts
    /// reuse the last source channel.
    fn sample_for(&self, dst_ch: usize, dst_channels: usize) -> f32 {
        match (self.src_channels, dst_channels) {
            (2, 1) => 0.5 * (self.src(0) + self.src(1)),
            (1, _) => self.src(0),
            (src, _) => self.src(dst_ch.min(src.saturating_sub(1))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(src_channels: usize, samples: &[f32]) -> Pending {
        Pending {
            pos: 0,
            src_channels,
            samples: samples.to_vec(),
        }
    }

    #[test]
    fn volume_rounds_to_whole_percent_and_clamps() {
        let v = VolumeControl::new(0.333, false);
        assert_eq!(v.volume(), 0.33);
        v.set_volume(4.0);
        assert_eq!(v.volume(), 1.0);
        v.set_volume(-1.0);
        assert_eq!(v.volume(), 0.0);
        v.set_volume(f32::NAN);
        assert_eq!(v.volume(), 0.0);
    }

    #[test]
    fn mute_zeroes_gain_but_keeps_level() {
        let v = VolumeControl::new(0.8, false);
        v.set_muted(true);
        assert_eq!(v.gain(), 0.0);
        assert_eq!(v.volume(), 0.8);
        v.set_muted(false);
        assert_eq!(v.gain(), 0.8);
    }

    #[test]
    fn mono_source_fills_both_stereo_channels() {
        let p = pending(1, &[0.25]);
        assert_eq!(p.sample_for(0, 2), 0.25);
        assert_eq!(p.sample_for(1, 2), 0.25);
    }

    #[test]
    fn stereo_source_downmixes_to_mono() {
        let p = pending(2, &[0.2, 0.6]);
        assert!((p.sample_for(0, 1) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn advance_steps_one_source_frame() {
        let mut p = pending(2, &[0.1, 0.2, 0.3, 0.4]);
        p.advance();
        assert_eq!(p.sample_for(0, 2), 0.3);
        assert_eq!(p.sample_for(1, 2), 0.4);
        p.advance();
        assert!(p.exhausted());
    }

    #[test]
    fn extra_device_channels_reuse_last_source_channel() {
        let p = pending(2, &[0.1, 0.9]);
        assert_eq!(p.sample_for(5, 6), 0.9);
    }
}
