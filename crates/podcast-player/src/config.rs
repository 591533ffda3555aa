use std::time::Duration;

/// Tuning for the native backend's decode/resample/output stages.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackConfig {
    /// Decoder/resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target buffer duration per queue, in seconds.
    pub buffer_seconds: f32,
    /// Interval between position updates while a session is running.
    pub tick: Duration,
    /// Output device substring; `None` picks the host default.
    pub device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
            tick: Duration::from_millis(250),
            device: None,
        }
    }
}

impl PlaybackConfig {
    /// Smaller buffers for sessions restarted mid-stream, so seeks land quickly.
    pub fn for_restart(&self) -> PlaybackConfig {
        let mut cfg = self.clone();
        cfg.buffer_seconds = cfg.buffer_seconds.min(1.0);
        cfg.refill_max_frames = cfg.refill_max_frames.min(2048);
        cfg.chunk_frames = cfg.chunk_frames.min(1024);
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_config_caps_buffers() {
        let cfg = PlaybackConfig {
            chunk_frames: 4096,
            refill_max_frames: 8192,
            buffer_seconds: 3.0,
            ..PlaybackConfig::default()
        };
        let eff = cfg.for_restart();
        assert_eq!(eff.buffer_seconds, 1.0);
        assert_eq!(eff.refill_max_frames, 2048);
        assert_eq!(eff.chunk_frames, 1024);
        assert_eq!(eff.tick, cfg.tick);
    }

    #[test]
    fn restart_config_keeps_small_values() {
        let cfg = PlaybackConfig {
            chunk_frames: 512,
            refill_max_frames: 1024,
            buffer_seconds: 0.5,
            ..PlaybackConfig::default()
        };
        assert_eq!(cfg.for_restart(), cfg);
    }
}
