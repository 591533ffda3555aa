//! Playback controller.
//!
//! Translates user intents (play/pause, seek, skip, rate, volume, mute) into
//! commands on an owned [`MediaHandle`] and keeps [`PlaybackState`] in step
//! with the events the handle reports.
//!
//! Lifecycle:
//! - `Unloaded → Loading` when a media handle is attached
//! - `Loading → ReadyPaused` on metadata (or `ReadyPlaying` if play was already requested)
//! - `ReadyPaused ↔ ReadyPlaying` via [`PlaybackController::toggle_play`]
//! - `Ready* → Ended` on end of stream, rewinding to 0
//! - `Ended → ReadyPlaying` via `toggle_play`, replaying from the start

use podcast_types::{Episode, PlaybackPhase, PlaybackStatus};

use crate::media::{MediaEvent, MediaHandle, Subscription};
use crate::rate::PlaybackRate;
use crate::state::PlaybackState;

/// Controller for one mounted episode.
///
/// Owns its media handle exclusively. The event listener registered on
/// attach is removed when the controller is detached or dropped.
pub struct PlaybackController<M: MediaHandle> {
    episode: Episode,
    media: Option<M>,
    subscription: Option<Subscription>,
    state: PlaybackState,
}

impl<M: MediaHandle> PlaybackController<M> {
    /// Controller with no media handle; every transport command is a no-op.
    pub fn new(episode: Episode) -> Self {
        Self {
            episode,
            media: None,
            subscription: None,
            state: PlaybackState::default(),
        }
    }

    /// Mount `episode` on `media` and start loading its audio.
    pub fn mount(episode: Episode, media: M) -> Self {
        let mut controller = Self::new(episode);
        controller.attach(media);
        controller
    }

    /// Attach a media handle, register the listener and request the source.
    ///
    /// A previously attached handle is detached first.
    pub fn attach(&mut self, mut media: M) {
        self.detach();

        self.subscription = Some(media.subscribe());
        media.set_volume(self.state.volume);
        media.set_muted(self.state.muted);
        media.set_rate(self.state.rate.as_f64());

        self.state.phase = PlaybackPhase::Loading;
        self.state.is_playing = false;
        self.state.current_time = 0.0;
        self.state.duration = 0.0;
        self.state.last_error = None;

        match self.episode.audio_source() {
            Some(source) => {
                tracing::info!(eid = %self.episode.eid, source, "loading episode");
                media.load(source, self.episode.enclosure.mime.as_deref());
            }
            None => {
                tracing::warn!(eid = %self.episode.eid, "episode has no audio source");
                self.state.last_error = Some("episode has no audio source".to_string());
            }
        }
        self.media = Some(media);
    }

    /// Remove the listener, stop output and hand the media handle back.
    pub fn detach(&mut self) -> Option<M> {
        let mut media = self.media.take()?;
        if let Some(sub) = self.subscription.take() {
            media.unsubscribe(sub.id);
        }
        media.stop();
        self.state = PlaybackState {
            volume: self.state.volume,
            muted: self.state.muted,
            rate: self.state.rate,
            ..PlaybackState::default()
        };
        tracing::debug!(eid = %self.episode.eid, "player detached");
        Some(media)
    }

    /// Close the player, returning the media handle.
    pub fn close(mut self) -> Option<M> {
        self.detach()
    }

    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn progress_percent(&self) -> f64 {
        self.state.progress_percent()
    }

    /// Pause when playing, play otherwise.
    pub fn toggle_play(&mut self) {
        let Some(media) = self.media.as_mut() else {
            return;
        };
        if self.state.is_playing {
            media.pause();
            self.state.is_playing = false;
            if self.state.phase == PlaybackPhase::ReadyPlaying {
                self.state.phase = PlaybackPhase::ReadyPaused;
            }
        } else {
            media.play();
            self.state.is_playing = true;
            if matches!(
                self.state.phase,
                PlaybackPhase::ReadyPaused | PlaybackPhase::Ended
            ) {
                self.state.phase = PlaybackPhase::ReadyPlaying;
            }
        }
        tracing::debug!(playing = self.state.is_playing, "toggle play");
    }

    /// Seek to `fraction` of the duration. The displayed position moves
    /// immediately rather than waiting for the next backend tick.
    pub fn seek_to(&mut self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let target = fraction.clamp(0.0, 1.0) * self.state.duration;
        self.move_to(target);
    }

    /// Seek to an absolute position in seconds.
    pub fn seek_to_time(&mut self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        self.move_to(seconds);
    }

    /// Move the position by `delta_seconds`, clamped to the stream bounds.
    pub fn skip(&mut self, delta_seconds: f64) {
        if !delta_seconds.is_finite() {
            return;
        }
        self.move_to(self.state.current_time + delta_seconds);
    }

    fn move_to(&mut self, seconds: f64) {
        let Some(media) = self.media.as_mut() else {
            return;
        };
        let target = self.state.clamp_time(seconds);
        media.set_position(target);
        self.state.current_time = target;
        if self.state.phase == PlaybackPhase::Ended {
            self.state.phase = PlaybackPhase::ReadyPaused;
        }
        tracing::debug!(target, "seek");
    }

    /// Advance to the next rate step (wrapping) and apply it.
    pub fn cycle_playback_rate(&mut self) -> PlaybackRate {
        let next = self.state.rate.next();
        if let Some(media) = self.media.as_mut() {
            media.set_rate(next.as_f64());
        }
        self.state.rate = next;
        tracing::debug!(rate = next.as_f64(), "playback rate");
        next
    }

    /// Store a new volume level. A zero level mutes, any other level unmutes.
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        let muted = volume == 0.0;
        if let Some(media) = self.media.as_mut() {
            media.set_volume(volume);
            media.set_muted(muted);
        }
        self.state.volume = volume;
        self.state.muted = muted;
    }

    /// Flip mute without touching the stored volume.
    pub fn toggle_mute(&mut self) {
        let Some(media) = self.media.as_mut() else {
            return;
        };
        let muted = !self.state.muted;
        media.set_muted(muted);
        self.state.muted = muted;
    }

    /// Apply every event the backend has delivered so far.
    pub fn pump(&mut self) -> usize {
        let events: Vec<MediaEvent> = match self.subscription.as_ref() {
            Some(sub) => sub.events.try_iter().collect(),
            None => return 0,
        };
        let n = events.len();
        for event in events {
            self.handle_event(event);
        }
        n
    }

    /// Apply one backend event.
    pub fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::MetadataLoaded { duration } => {
                let duration = duration
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .or_else(|| self.episode.duration_hint())
                    .unwrap_or(0.0);
                self.state.duration = duration;
                self.state.current_time = self.state.clamp_time(self.state.current_time);
                if self.state.phase == PlaybackPhase::Loading {
                    self.state.phase = if self.state.is_playing {
                        PlaybackPhase::ReadyPlaying
                    } else {
                        PlaybackPhase::ReadyPaused
                    };
                }
                tracing::info!(eid = %self.episode.eid, duration, "metadata loaded");
            }
            MediaEvent::TimeUpdate { position } => {
                if position.is_finite() && self.state.phase != PlaybackPhase::Ended {
                    self.state.current_time = self.state.clamp_time(position);
                }
            }
            MediaEvent::Ended => {
                self.state.phase = PlaybackPhase::Ended;
                self.state.is_playing = false;
                self.state.current_time = 0.0;
                tracing::info!(eid = %self.episode.eid, "episode ended");
            }
            MediaEvent::Error(message) => {
                tracing::warn!(eid = %self.episode.eid, "playback error: {message}");
                self.state.is_playing = false;
                if self.state.phase == PlaybackPhase::ReadyPlaying {
                    self.state.phase = PlaybackPhase::ReadyPaused;
                }
                self.state.last_error = Some(message);
            }
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        let mounted = self.media.is_some();
        PlaybackStatus {
            episode_id: mounted.then(|| self.episode.eid.clone()),
            title: mounted.then(|| self.episode.title.clone()),
            phase: self.state.phase,
            is_playing: self.state.is_playing,
            current_time_secs: self.state.current_time,
            duration_secs: self.state.duration,
            progress_percent: self.state.progress_percent(),
            playback_rate: self.state.rate.as_f64(),
            volume: self.state.volume,
            muted: self.state.muted,
            last_error: self.state.last_error.clone(),
        }
    }
}

impl<M: MediaHandle> Drop for PlaybackController<M> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ListenerId, Listeners};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Load(String),
        Play,
        Pause,
        Stop,
        Position(f64),
        Rate(f64),
        Volume(f32),
        Muted(bool),
        Subscribe,
        Unsubscribe(ListenerId),
    }

    #[derive(Clone, Default)]
    struct FakeMedia {
        calls: Arc<Mutex<Vec<Call>>>,
        listeners: Arc<Listeners>,
    }

    impl FakeMedia {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl MediaHandle for FakeMedia {
        fn load(&mut self, source: &str, _mime: Option<&str>) {
            self.record(Call::Load(source.to_string()));
        }
        fn play(&mut self) {
            self.record(Call::Play);
        }
        fn pause(&mut self) {
            self.record(Call::Pause);
        }
        fn stop(&mut self) {
            self.record(Call::Stop);
        }
        fn set_position(&mut self, seconds: f64) {
            self.record(Call::Position(seconds));
        }
        fn set_rate(&mut self, rate: f64) {
            self.record(Call::Rate(rate));
        }
        fn set_volume(&mut self, volume: f32) {
            self.record(Call::Volume(volume));
        }
        fn set_muted(&mut self, muted: bool) {
            self.record(Call::Muted(muted));
        }
        fn subscribe(&mut self) -> Subscription {
            self.record(Call::Subscribe);
            self.listeners.subscribe()
        }
        fn unsubscribe(&mut self, id: ListenerId) {
            self.record(Call::Unsubscribe(id));
            self.listeners.unsubscribe(id);
        }
    }

    fn episode() -> Episode {
        let mut ep = Episode {
            eid: "ep-1".to_string(),
            title: "Pilot".to_string(),
            ..Episode::default()
        };
        ep.enclosure.url = "https://cdn.example/ep-1.mp3".to_string();
        ep.enclosure.duration = 590.0;
        ep
    }

    fn ready(duration: f64) -> (PlaybackController<FakeMedia>, FakeMedia) {
        let media = FakeMedia::default();
        let mut c = PlaybackController::mount(episode(), media.clone());
        c.handle_event(MediaEvent::MetadataLoaded {
            duration: Some(duration),
        });
        media.clear();
        (c, media)
    }

    #[test]
    fn mount_subscribes_and_loads_source() {
        let media = FakeMedia::default();
        let c = PlaybackController::mount(episode(), media.clone());
        assert_eq!(c.state().phase, PlaybackPhase::Loading);
        let calls = media.calls();
        assert_eq!(calls[0], Call::Subscribe);
        assert!(calls.contains(&Call::Load("https://cdn.example/ep-1.mp3".to_string())));
        assert_eq!(media.listeners.len(), 1);
    }

    #[test]
    fn mount_without_source_records_error() {
        let media = FakeMedia::default();
        let c = PlaybackController::mount(Episode::default(), media.clone());
        assert!(c.state().last_error.is_some());
        assert!(!media.calls().iter().any(|c| matches!(c, Call::Load(_))));
    }

    #[test]
    fn metadata_moves_loading_to_ready_paused() {
        let (c, _media) = ready(600.0);
        assert_eq!(c.state().phase, PlaybackPhase::ReadyPaused);
        assert_eq!(c.state().duration, 600.0);
    }

    #[test]
    fn unknown_duration_falls_back_to_episode_hint() {
        let media = FakeMedia::default();
        let mut c = PlaybackController::mount(episode(), media);
        c.handle_event(MediaEvent::MetadataLoaded { duration: None });
        assert_eq!(c.state().duration, 590.0);
    }

    #[test]
    fn toggle_play_alternates_and_issues_commands() {
        let (mut c, media) = ready(600.0);
        c.toggle_play();
        assert!(c.state().is_playing);
        assert_eq!(c.state().phase, PlaybackPhase::ReadyPlaying);
        c.toggle_play();
        assert!(!c.state().is_playing);
        assert_eq!(c.state().phase, PlaybackPhase::ReadyPaused);
        assert_eq!(media.calls(), vec![Call::Play, Call::Pause]);
    }

    #[test]
    fn play_requested_while_loading_lands_in_ready_playing() {
        let media = FakeMedia::default();
        let mut c = PlaybackController::mount(episode(), media);
        c.toggle_play();
        assert_eq!(c.state().phase, PlaybackPhase::Loading);
        c.handle_event(MediaEvent::MetadataLoaded {
            duration: Some(100.0),
        });
        assert_eq!(c.state().phase, PlaybackPhase::ReadyPlaying);
    }

    #[test]
    fn commands_without_media_are_noops() {
        let mut c: PlaybackController<FakeMedia> = PlaybackController::new(episode());
        c.toggle_play();
        c.seek_to(0.5);
        c.skip(30.0);
        c.toggle_mute();
        assert!(!c.state().is_playing);
        assert_eq!(c.state().current_time, 0.0);
        assert!(!c.state().muted);
        assert_eq!(c.pump(), 0);
    }

    #[test]
    fn seek_to_sets_fraction_of_duration() {
        let (mut c, media) = ready(600.0);
        for f in [0.0, 0.1, 0.25, 0.5, 0.999, 1.0] {
            c.seek_to(f);
            assert!((c.state().current_time - f * 600.0).abs() < 1e-9);
        }
        assert_eq!(media.calls().last(), Some(&Call::Position(600.0)));
    }

    #[test]
    fn click_at_half_width_lands_mid_episode() {
        let (mut c, _media) = ready(600.0);
        c.seek_to(0.5);
        assert_eq!(c.state().current_time, 300.0);
        assert!((c.progress_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn seek_outside_range_is_clamped_and_nan_ignored() {
        let (mut c, media) = ready(600.0);
        c.seek_to(1.5);
        assert_eq!(c.state().current_time, 600.0);
        c.seek_to(-0.2);
        assert_eq!(c.state().current_time, 0.0);
        media.clear();
        c.seek_to(f64::NAN);
        assert!(media.calls().is_empty());
    }

    #[test]
    fn skip_back_clamps_at_zero() {
        let (mut c, media) = ready(600.0);
        c.handle_event(MediaEvent::TimeUpdate { position: 10.0 });
        c.skip(-15.0);
        assert_eq!(c.state().current_time, 0.0);
        assert_eq!(media.calls(), vec![Call::Position(0.0)]);
    }

    #[test]
    fn skip_forward_clamps_at_duration() {
        let (mut c, _media) = ready(600.0);
        c.handle_event(MediaEvent::TimeUpdate { position: 590.0 });
        c.skip(30.0);
        assert_eq!(c.state().current_time, 600.0);
    }

    #[test]
    fn cycle_rate_steps_and_wraps() {
        let (mut c, media) = ready(600.0);
        assert_eq!(c.cycle_playback_rate(), PlaybackRate::OneAndQuarter);
        assert_eq!(c.cycle_playback_rate(), PlaybackRate::OneAndHalf);
        assert_eq!(media.calls(), vec![Call::Rate(1.25), Call::Rate(1.5)]);
        for _ in 0..4 {
            c.cycle_playback_rate();
        }
        assert_eq!(c.state().rate, PlaybackRate::Normal);
    }

    #[test]
    fn zero_volume_mutes_and_positive_volume_unmutes() {
        let (mut c, media) = ready(600.0);
        c.set_volume(0.0);
        assert!(c.state().muted);
        c.set_volume(0.4);
        assert!(!c.state().muted);
        assert_eq!(c.state().volume, 0.4);

        c.toggle_mute();
        assert!(c.state().muted);
        c.set_volume(0.6);
        assert!(!c.state().muted);
        assert_eq!(media.calls().last(), Some(&Call::Muted(false)));
    }

    #[test]
    fn toggle_mute_twice_keeps_volume() {
        let (mut c, _media) = ready(600.0);
        c.set_volume(0.3);
        c.toggle_mute();
        c.toggle_mute();
        assert!(!c.state().muted);
        assert_eq!(c.state().volume, 0.3);
    }

    #[test]
    fn end_of_stream_rewinds_and_stops() {
        let (mut c, _media) = ready(600.0);
        c.cycle_playback_rate();
        c.set_volume(0.2);
        c.toggle_play();
        c.handle_event(MediaEvent::TimeUpdate { position: 599.0 });
        c.handle_event(MediaEvent::Ended);
        assert_eq!(c.state().phase, PlaybackPhase::Ended);
        assert!(!c.state().is_playing);
        assert_eq!(c.state().current_time, 0.0);
    }

    #[test]
    fn toggle_play_after_end_replays() {
        let (mut c, media) = ready(600.0);
        c.toggle_play();
        c.handle_event(MediaEvent::Ended);
        media.clear();
        c.toggle_play();
        assert_eq!(c.state().phase, PlaybackPhase::ReadyPlaying);
        assert_eq!(media.calls(), vec![Call::Play]);
    }

    #[test]
    fn time_update_never_exceeds_duration() {
        let (mut c, _media) = ready(600.0);
        c.handle_event(MediaEvent::TimeUpdate { position: 601.5 });
        assert_eq!(c.state().current_time, 600.0);
    }

    #[test]
    fn error_stops_playback_and_is_kept() {
        let (mut c, _media) = ready(600.0);
        c.toggle_play();
        c.handle_event(MediaEvent::Error("decode failed".to_string()));
        assert!(!c.state().is_playing);
        assert_eq!(c.state().phase, PlaybackPhase::ReadyPaused);
        assert_eq!(c.status().last_error.as_deref(), Some("decode failed"));
    }

    #[test]
    fn pump_applies_backend_events_in_order() {
        let media = FakeMedia::default();
        let mut c = PlaybackController::mount(episode(), media.clone());
        media.listeners.emit(MediaEvent::MetadataLoaded {
            duration: Some(120.0),
        });
        media.listeners.emit(MediaEvent::TimeUpdate { position: 30.0 });
        assert_eq!(c.pump(), 2);
        assert_eq!(c.state().phase, PlaybackPhase::ReadyPaused);
        assert_eq!(c.state().current_time, 30.0);
        assert!((c.progress_percent() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn drop_unsubscribes_and_stops() {
        let media = FakeMedia::default();
        let c = PlaybackController::mount(episode(), media.clone());
        drop(c);
        let calls = media.calls();
        assert!(calls.iter().any(|c| matches!(c, Call::Unsubscribe(_))));
        assert_eq!(calls.last(), Some(&Call::Stop));
        assert!(!calls.contains(&Call::Pause));
        assert!(media.listeners.is_empty());
    }

    #[test]
    fn status_reports_mounted_episode() {
        let (mut c, _media) = ready(600.0);
        c.seek_to(0.5);
        let status = c.status();
        assert_eq!(status.episode_id.as_deref(), Some("ep-1"));
        assert_eq!(status.phase, PlaybackPhase::ReadyPaused);
        assert_eq!(status.current_time_secs, 300.0);
        assert_eq!(status.playback_rate, 1.0);
    }
}
