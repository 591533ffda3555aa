//! Optional TOML settings file.
//!
//! Every key is optional; command-line flags win over file values.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use podcast_player::PlaybackConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// Output device name substring.
    pub device: Option<String>,
    /// Starting volume in `[0, 1]`.
    pub volume: Option<f32>,
    /// Seconds jumped by skip-back (default 15).
    pub skip_back_secs: Option<f64>,
    /// Seconds jumped by skip-forward (default 30).
    pub skip_forward_secs: Option<f64>,
    /// Position update interval in milliseconds (default 250).
    pub tick_ms: Option<u64>,
    pub buffer_seconds: Option<f32>,
    pub chunk_frames: Option<usize>,
    pub refill_max_frames: Option<usize>,
}

/// Settings after defaults and overrides are applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub playback: PlaybackConfig,
    pub volume: f32,
    pub skip_back_secs: f64,
    pub skip_forward_secs: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            volume: 1.0,
            skip_back_secs: 15.0,
            skip_forward_secs: 30.0,
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read config {path:?}"))?;
        toml::from_str::<CliConfig>(&raw).with_context(|| format!("parse config {path:?}"))
    }

    /// Load `path` if given; no path means all defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Resolve against defaults; `device_override` comes from `--device`.
    pub fn resolve(&self, device_override: Option<&str>) -> Settings {
        let defaults = Settings::default();
        let mut playback = defaults.playback.clone();
        playback.device = device_override
            .map(str::to_string)
            .or_else(|| self.device.clone());
        if let Some(ms) = self.tick_ms.filter(|ms| *ms > 0) {
            playback.tick = Duration::from_millis(ms);
        }
        if let Some(secs) = self.buffer_seconds.filter(|s| s.is_finite() && *s > 0.0) {
            playback.buffer_seconds = secs;
        }
        if let Some(frames) = self.chunk_frames.filter(|f| *f > 0) {
            playback.chunk_frames = frames;
        }
        if let Some(frames) = self.refill_max_frames.filter(|f| *f > 0) {
            playback.refill_max_frames = frames;
        }

        Settings {
            playback,
            volume: self
                .volume
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(defaults.volume),
            skip_back_secs: positive_or(self.skip_back_secs, defaults.skip_back_secs),
            skip_forward_secs: positive_or(self.skip_forward_secs, defaults.skip_forward_secs),
        }
    }
}

fn positive_or(value: Option<f64>, fallback: f64) -> f64 {
    value.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: CliConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.resolve(None), Settings::default());
    }

    #[test]
    fn file_values_apply() {
        let cfg: CliConfig = toml::from_str(
            r#"
            device = "USB"
            volume = 0.6
            skip_back_secs = 10.0
            tick_ms = 100
            buffer_seconds = 3.5
            "#,
        )
        .unwrap();
        let s = cfg.resolve(None);
        assert_eq!(s.playback.device.as_deref(), Some("USB"));
        assert_eq!(s.volume, 0.6);
        assert_eq!(s.skip_back_secs, 10.0);
        assert_eq!(s.skip_forward_secs, 30.0);
        assert_eq!(s.playback.tick, Duration::from_millis(100));
        assert_eq!(s.playback.buffer_seconds, 3.5);
    }

    #[test]
    fn device_flag_overrides_file() {
        let cfg = CliConfig {
            device: Some("USB".to_string()),
            ..CliConfig::default()
        };
        let s = cfg.resolve(Some("Speakers"));
        assert_eq!(s.playback.device.as_deref(), Some("Speakers"));
    }

    #[test]
    fn out_of_range_values_fall_back_or_clamp() {
        let cfg = CliConfig {
            volume: Some(3.0),
            skip_forward_secs: Some(-5.0),
            tick_ms: Some(0),
            ..CliConfig::default()
        };
        let s = cfg.resolve(None);
        assert_eq!(s.volume, 1.0);
        assert_eq!(s.skip_forward_secs, 30.0);
        assert_eq!(s.playback.tick, Duration::from_millis(250));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<CliConfig>("colour = \"red\"").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = CliConfig::load(Path::new("/no/such/podcast.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("read config"));
    }
}
