//! Output device discovery and stream config selection.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Buffer size ceiling; larger buffers make pause and seek feel sluggish.
const MAX_BUFFER_FRAMES: u32 = 4096;

/// An output device as shown by `devices`.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputDevice {
    pub name: String,
    pub is_default: bool,
    /// Supported sample rate span, when the device reports one.
    pub rates: Option<(u32, u32)>,
}

/// First output device whose name contains `needle` (case-insensitive), or
/// the host default when `needle` is `None` or blank.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle.map(str::trim).filter(|n| !n.is_empty()) {
        let mut devices = host.output_devices().context("enumerate output devices")?;
        return devices
            .find(|d| device_name(d).is_some_and(|n| name_matches(&n, needle)))
            .ok_or_else(|| anyhow!("no output device matched {needle:?}"));
    }
    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))
}

/// Supported output config closest to `source_rate`.
///
/// Prefers the exact source rate, then the nearest rate above it (upsampling
/// keeps quality), then the nearest below. Float formats win ties.
pub fn pick_output_config(
    device: &cpal::Device,
    source_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(Score, cpal::SupportedStreamConfig)> = None;
    for range in device.supported_output_configs()? {
        let rate = rate_in_range(range.min_sample_rate(), range.max_sample_rate(), source_rate);
        let score = Score::new(rate, source_rate, range.sample_format());
        if best.as_ref().is_none_or(|(b, _)| score < *b) {
            best = Some((score, range.with_sample_rate(rate)));
        }
    }
    match best {
        Some((_, cfg)) => Ok(cfg),
        None => device
            .default_output_config()
            .context("device reports no output configs"),
    }
}

/// Fixed buffer size when the device reports a range, capped to stay responsive.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(clamp_buffer(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Output devices of the default host.
pub fn output_devices() -> Result<Vec<OutputDevice>> {
    list_devices(&cpal::default_host())
}

/// Output devices of `host`, with the default one flagged.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<OutputDevice>> {
    let default_name = host.default_output_device().as_ref().and_then(device_name);
    let mut out = Vec::new();
    for d in host.output_devices().context("enumerate output devices")? {
        let Some(name) = device_name(&d) else {
            continue;
        };
        let rates = d.supported_output_configs().ok().and_then(|ranges| {
            ranges.fold(None, |acc: Option<(u32, u32)>, r| {
                let (lo, hi) = (r.min_sample_rate(), r.max_sample_rate());
                Some(match acc {
                    Some((a, b)) => (a.min(lo), b.max(hi)),
                    None => (lo, hi),
                })
            })
        });
        out.push(OutputDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            rates,
        });
    }
    Ok(out)
}

/// Human-readable device name.
pub fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

fn name_matches(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.to_lowercase())
}

fn rate_in_range(min: u32, max: u32, target: Option<u32>) -> u32 {
    match target {
        Some(t) => t.clamp(min, max.max(min)),
        None => max,
    }
}

fn clamp_buffer(min: u32, max: u32) -> u32 {
    max.min(MAX_BUFFER_FRAMES).max(min)
}

/// Ordering key for candidate configs; smaller is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Score {
    /// 0 exact, 1 above the source rate, 2 below it.
    side: u8,
    distance: u32,
    format: u8,
}

impl Score {
    fn new(rate: u32, target: Option<u32>, format: cpal::SampleFormat) -> Self {
        let (side, distance) = match target {
            Some(t) if rate == t => (0, 0),
            Some(t) if rate > t => (1, rate - t),
            Some(t) => (2, t - rate),
            // No target: highest rate wins.
            None => (0, u32::MAX - rate),
        };
        Self {
            side,
            distance,
            format: format_rank(format),
        }
    }
}

fn format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SampleFormat;

    #[test]
    fn name_match_is_case_insensitive() {
        assert!(name_matches("USB Headphones", "headphones"));
        assert!(!name_matches("USB Headphones", "speaker"));
    }

    #[test]
    fn rate_in_range_clamps_to_range() {
        assert_eq!(rate_in_range(44_100, 96_000, Some(48_000)), 48_000);
        assert_eq!(rate_in_range(44_100, 96_000, Some(22_050)), 44_100);
        assert_eq!(rate_in_range(44_100, 96_000, Some(192_000)), 96_000);
        assert_eq!(rate_in_range(44_100, 96_000, None), 96_000);
    }

    #[test]
    fn exact_rate_beats_upsampling_beats_downsampling() {
        let exact = Score::new(44_100, Some(44_100), SampleFormat::I16);
        let above = Score::new(48_000, Some(44_100), SampleFormat::F32);
        let below = Score::new(32_000, Some(44_100), SampleFormat::F32);
        assert!(exact < above);
        assert!(above < below);
    }

    #[test]
    fn float_wins_ties() {
        let f = Score::new(48_000, Some(48_000), SampleFormat::F32);
        let i = Score::new(48_000, Some(48_000), SampleFormat::I16);
        assert!(f < i);
    }

    #[test]
    fn without_target_highest_rate_wins() {
        let hi = Score::new(96_000, None, SampleFormat::F32);
        let lo = Score::new(48_000, None, SampleFormat::F32);
        assert!(hi < lo);
    }

    #[test]
    fn buffer_is_capped_but_respects_minimum() {
        assert_eq!(clamp_buffer(64, 16_384), MAX_BUFFER_FRAMES);
        assert_eq!(clamp_buffer(64, 1024), 1024);
        assert_eq!(clamp_buffer(8192, 16_384), 8192);
    }
}
