use serde::{Deserialize, Serialize};

/// Lifecycle phase of a mounted player.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// No episode mounted yet.
    #[default]
    Unloaded,
    /// Source requested, waiting for metadata.
    Loading,
    /// Metadata known, output paused.
    ReadyPaused,
    /// Metadata known, output running.
    ReadyPlaying,
    /// Natural end of stream was reached.
    Ended,
}

/// Audio attachment of an episode.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Enclosure {
    /// Audio locator (http(s) URL or local path).
    #[serde(default)]
    pub url: String,
    /// Duration hint in seconds as published by the feed.
    #[serde(default)]
    pub duration: f64,
    /// MIME type, e.g. `audio/mpeg`.
    #[serde(rename = "type", default)]
    pub mime: Option<String>,
}

/// One podcast episode as exported by the podcast page.
///
/// Read-only input for the player: only the audio source, title and
/// duration hint are consumed during playback.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub eid: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enclosure: Enclosure,
    /// Publish date (RFC 3339).
    #[serde(default)]
    pub pub_date: Option<String>,
    #[serde(default, alias = "playedCount")]
    pub play_count: Option<u64>,
    #[serde(default)]
    pub favorite_count: Option<u64>,
    #[serde(default)]
    pub comment_count: Option<u64>,
    /// Legacy audio locator used when the enclosure has none.
    #[serde(default)]
    pub audio: Option<String>,
}

impl Episode {
    /// Audio locator: the enclosure URL, else the legacy `audio` field.
    pub fn audio_source(&self) -> Option<&str> {
        let url = self.enclosure.url.trim();
        if !url.is_empty() {
            return Some(url);
        }
        self.audio
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Published duration in seconds, if the feed carries a usable one.
    pub fn duration_hint(&self) -> Option<f64> {
        let d = self.enclosure.duration;
        (d.is_finite() && d > 0.0).then_some(d)
    }
}

/// Podcast show with its episodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Podcast {
    #[serde(default)]
    pub pid: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub episode_count: u64,
    #[serde(default)]
    pub subscription_count: u64,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// Chapter marker parsed from an episode description (`12:34 Topic`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    /// Label as written in the description.
    pub time: String,
    /// Offset from the start in seconds.
    pub seconds: u32,
    pub text: String,
}

/// Snapshot of a mounted player, suitable for logs and JSON output.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStatus {
    /// Episode id of the mounted episode.
    pub episode_id: Option<String>,
    /// Episode title of the mounted episode.
    pub title: Option<String>,
    pub phase: PlaybackPhase,
    pub is_playing: bool,
    /// Current position in seconds.
    pub current_time_secs: f64,
    /// Total duration in seconds, `0.0` while unknown.
    pub duration_secs: f64,
    /// Position as percent of duration, `0.0` while duration is unknown.
    pub progress_percent: f64,
    pub playback_rate: f64,
    /// Stored volume level in `[0, 1]`; independent of `muted`.
    pub volume: f32,
    pub muted: bool,
    /// Last error reported by the media backend.
    pub last_error: Option<String>,
}
