//! Transient player state mirrored from the native backend.

use podcast_types::PlaybackPhase;

use crate::rate::PlaybackRate;

/// State of one mounted player.
///
/// `current_time` never exceeds `duration` once the duration is known.
/// `volume` and `muted` are independent: muting keeps the stored level.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    pub is_playing: bool,
    /// Position in seconds.
    pub current_time: f64,
    /// Total length in seconds; `0.0` until metadata arrives.
    pub duration: f64,
    pub rate: PlaybackRate,
    /// Stored level in `[0, 1]`.
    pub volume: f32,
    pub muted: bool,
    /// Last backend error, kept for display.
    pub last_error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Unloaded,
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            rate: PlaybackRate::Normal,
            volume: 1.0,
            muted: false,
            last_error: None,
        }
    }
}

impl PlaybackState {
    pub fn duration_known(&self) -> bool {
        self.duration > 0.0
    }

    /// Position as a fraction of duration in `[0, 1]`; `0` while duration is unknown.
    pub fn progress_fraction(&self) -> f64 {
        if self.duration_known() {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Position as percent of duration; `0` while duration is unknown.
    pub fn progress_percent(&self) -> f64 {
        self.progress_fraction() * 100.0
    }

    /// Clamp a position to `[0, duration]`, or `[0, ∞)` while duration is unknown.
    pub fn clamp_time(&self, seconds: f64) -> f64 {
        let t = seconds.max(0.0);
        if self.duration_known() {
            t.min(self.duration)
        } else {
            t
        }
    }
}
