//! Native media backend.
//!
//! [`NativeMedia`] owns a worker thread that receives transport commands over
//! a channel, runs at most one playback [`Session`] at a time and reports
//! progress to every registered listener. Seeks and rate changes restart the
//! session at the new position.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::config::PlaybackConfig;
use crate::decode::{self, SourceInfo};
use crate::media::{ListenerId, Listeners, MediaEvent, MediaHandle, Subscription};
use crate::output::VolumeControl;
use crate::session::{Session, SessionOutcome, SessionRequest};

enum Msg {
    Load { source: String, mime: Option<String> },
    Play,
    Pause,
    Stop,
    Seek(f64),
    Rate(f64),
    Probed { load_id: u64, result: Result<SourceInfo, String> },
    SessionEnded { id: u64, outcome: SessionOutcome },
    Shutdown,
}

/// Audio backend playing through the default (or configured) output device.
pub struct NativeMedia {
    tx: Sender<Msg>,
    listeners: Arc<Listeners>,
    volume: Arc<VolumeControl>,
    join: Option<JoinHandle<()>>,
}

impl NativeMedia {
    /// Spawn the worker thread.
    pub fn spawn(cfg: PlaybackConfig) -> NativeMedia {
        let (tx, rx) = unbounded();
        let listeners = Arc::new(Listeners::default());
        let volume = Arc::new(VolumeControl::default());

        let worker = Worker {
            cfg,
            listeners: listeners.clone(),
            volume: volume.clone(),
            tx: tx.clone(),
            track: None,
            load_id: 0,
            position: 0.0,
            speed: 1.0,
            playing: false,
            session: None,
            next_session: 0,
        };
        let join = thread::Builder::new()
            .name("media-worker".to_string())
            .spawn(move || worker.run(rx));
        let join = match join {
            Ok(j) => Some(j),
            Err(e) => {
                tracing::error!("spawn media worker: {e}");
                None
            }
        };

        NativeMedia {
            tx,
            listeners,
            volume,
            join,
        }
    }

    fn send(&self, msg: Msg) {
        if self.tx.send(msg).is_err() {
            tracing::warn!("media worker is gone; command dropped");
        }
    }
}

impl MediaHandle for NativeMedia {
    fn load(&mut self, source: &str, mime: Option<&str>) {
        self.send(Msg::Load {
            source: source.to_string(),
            mime: mime.map(str::to_string),
        });
    }

    fn play(&mut self) {
        self.send(Msg::Play);
    }

    fn pause(&mut self) {
        self.send(Msg::Pause);
    }

    fn stop(&mut self) {
        self.send(Msg::Stop);
    }

    fn set_position(&mut self, seconds: f64) {
        self.send(Msg::Seek(seconds));
    }

    fn set_rate(&mut self, rate: f64) {
        self.send(Msg::Rate(rate));
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume.set_volume(volume);
    }

    fn set_muted(&mut self, muted: bool) {
        self.volume.set_muted(muted);
    }

    fn subscribe(&mut self) -> Subscription {
        self.listeners.subscribe()
    }

    fn unsubscribe(&mut self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }
}

impl Drop for NativeMedia {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

struct Track {
    source: String,
    mime: Option<String>,
    duration: Option<f64>,
}

struct Worker {
    cfg: PlaybackConfig,
    listeners: Arc<Listeners>,
    volume: Arc<VolumeControl>,
    tx: Sender<Msg>,
    track: Option<Track>,
    /// Bumped on every load so stale probe results are ignored.
    load_id: u64,
    /// Position while no session is running.
    position: f64,
    speed: f64,
    playing: bool,
    session: Option<Session>,
    next_session: u64,
}

impl Worker {
    fn run(mut self, rx: Receiver<Msg>) {
        let tick = self.cfg.tick.max(Duration::from_millis(10));
        let mut next_tick = Instant::now() + tick;
        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok(Msg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(msg) => self.handle(msg),
                Err(RecvTimeoutError::Timeout) => {}
            }
            if Instant::now() >= next_tick {
                self.tick();
                next_tick = Instant::now() + tick;
            }
        }
        if let Some(session) = self.session.take() {
            session.stop_detached();
        }
        tracing::debug!("media worker stopped");
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Load { source, mime } => self.load(source, mime),
            Msg::Play => self.play(),
            Msg::Pause => self.pause(),
            Msg::Stop => self.unload(),
            Msg::Seek(seconds) => self.seek(seconds),
            Msg::Rate(speed) => self.set_speed(speed),
            Msg::Probed { load_id, result } => self.probed(load_id, result),
            Msg::SessionEnded { id, outcome } => self.session_ended(id, outcome),
            Msg::Shutdown => {}
        }
    }

    fn load(&mut self, source: String, mime: Option<String>) {
        self.unload();
        tracing::info!(source = %source, "loading episode audio");

        let load_id = self.load_id;
        let tx = self.tx.clone();
        let probe_source = source.clone();
        let probe_mime = mime.clone();
        thread::spawn(move || {
            let result =
                decode::probe(&probe_source, probe_mime.as_deref()).map_err(|e| format!("{e:#}"));
            let _ = tx.send(Msg::Probed { load_id, result });
        });

        self.track = Some(Track {
            source,
            mime,
            duration: None,
        });
    }

    /// Drop the session and the track. Bumping `load_id` discards a pending probe.
    fn unload(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop_detached();
        }
        if self.track.take().is_some() {
            tracing::debug!("episode audio unloaded");
        }
        self.load_id += 1;
        self.position = 0.0;
        self.playing = false;
    }

    fn probed(&mut self, load_id: u64, result: Result<SourceInfo, String>) {
        if load_id != self.load_id {
            return;
        }
        match result {
            Ok(info) => {
                if let Some(track) = self.track.as_mut() {
                    track.duration = info.duration;
                }
                tracing::debug!(
                    duration = ?info.duration,
                    codec = info.codec.as_deref().unwrap_or("?"),
                    "metadata loaded"
                );
                self.listeners.emit(MediaEvent::MetadataLoaded {
                    duration: info.duration,
                });
            }
            Err(msg) => {
                tracing::warn!("load failed: {msg}");
                self.track = None;
                self.playing = false;
                self.listeners.emit(MediaEvent::Error(msg));
            }
        }
    }

    fn play(&mut self) {
        if self.track.is_none() {
            tracing::debug!("play ignored: nothing loaded");
            return;
        }
        self.playing = true;
        match self.session.as_ref() {
            Some(session) => session.set_paused(false),
            None => self.start_session(self.position),
        }
    }

    fn pause(&mut self) {
        self.playing = false;
        if let Some(session) = self.session.as_ref() {
            session.set_paused(true);
            self.position = session.position();
        }
    }

    fn seek(&mut self, seconds: f64) {
        let Some(track) = self.track.as_ref() else {
            return;
        };
        if !seconds.is_finite() {
            return;
        }
        let target = clamp_position(seconds, track.duration);
        self.restart_at(target);
        self.listeners
            .emit(MediaEvent::TimeUpdate { position: target });
    }

    fn set_speed(&mut self, speed: f64) {
        if !speed.is_finite() || speed <= 0.0 || speed == self.speed {
            return;
        }
        self.speed = speed;
        if let Some(session) = self.session.as_ref() {
            let at = session.position();
            self.restart_at(at);
        }
    }

    /// Move to `seconds`; a running session is replaced, a paused one is dropped.
    fn restart_at(&mut self, seconds: f64) {
        self.position = seconds;
        if let Some(session) = self.session.take() {
            session.stop_detached();
        }
        if self.playing {
            self.start_session(seconds);
        }
    }

    fn start_session(&mut self, start_secs: f64) {
        let Some(track) = self.track.as_ref() else {
            return;
        };
        self.next_session += 1;
        let id = self.next_session;
        let cfg = if start_secs > 0.0 {
            self.cfg.for_restart()
        } else {
            self.cfg.clone()
        };
        let req = SessionRequest {
            source: track.source.clone(),
            mime: track.mime.clone(),
            start_secs,
            speed: self.speed,
            paused: !self.playing,
        };
        let tx = self.tx.clone();
        self.session = Some(Session::spawn(id, req, cfg, self.volume.clone(), move |id, outcome| {
            let _ = tx.send(Msg::SessionEnded { id, outcome });
        }));
    }

    fn session_ended(&mut self, id: u64, outcome: SessionOutcome) {
        if self.session.as_ref().map(|s| s.id) != Some(id) {
            return;
        }
        let Some(session) = self.session.take() else {
            return;
        };
        let at = session.position();
        session.stop();

        match outcome {
            SessionOutcome::Finished => {
                self.position = 0.0;
                self.playing = false;
                self.listeners.emit(MediaEvent::Ended);
            }
            SessionOutcome::Failed(msg) => {
                self.position = at;
                self.playing = false;
                self.listeners.emit(MediaEvent::Error(msg));
            }
            SessionOutcome::Cancelled => self.position = at,
        }
    }

    fn tick(&mut self) {
        if !self.playing {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let duration = self.track.as_ref().and_then(|t| t.duration);
        let position = clamp_position(session.position(), duration);
        self.listeners.emit(MediaEvent::TimeUpdate { position });
    }
}

fn clamp_position(seconds: f64, duration: Option<f64>) -> f64 {
    let t = seconds.max(0.0);
    match duration {
        Some(d) if d > 0.0 => t.min(d),
        _ => t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> PlaybackConfig {
        PlaybackConfig {
            tick: Duration::from_millis(20),
            ..PlaybackConfig::default()
        }
    }

    #[test]
    fn clamp_position_bounds_to_duration() {
        assert_eq!(clamp_position(-3.0, None), 0.0);
        assert_eq!(clamp_position(900.0, None), 900.0);
        assert_eq!(clamp_position(900.0, Some(600.0)), 600.0);
        assert_eq!(clamp_position(12.0, Some(0.0)), 12.0);
    }

    #[test]
    fn unreadable_source_reports_error() {
        let mut media = NativeMedia::spawn(quick());
        let sub = media.subscribe();
        media.load("/no/such/episode.mp3", Some("audio/mpeg"));
        let event = sub.events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, MediaEvent::Error(msg) if msg.contains("open")));
    }

    #[test]
    fn commands_without_a_source_emit_nothing() {
        let mut media = NativeMedia::spawn(quick());
        let sub = media.subscribe();
        media.play();
        media.set_position(30.0);
        media.set_rate(1.5);
        media.pause();
        assert!(sub.events.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn unsubscribed_listener_is_not_notified() {
        let mut media = NativeMedia::spawn(quick());
        let kept = media.subscribe();
        let dropped = media.subscribe();
        media.unsubscribe(dropped.id);
        media.load("/no/such/episode.mp3", None);
        assert!(kept.events.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(dropped.events.try_recv().is_err());
    }

    fn next_event(sub: &Subscription) -> MediaEvent {
        sub.events.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn metadata_reports_probed_duration() {
        let mut media = NativeMedia::spawn(quick());
        let sub = media.subscribe();
        media.load(&decode::write_ramp_wav("native-meta"), Some("audio/wav"));
        assert_eq!(
            next_event(&sub),
            MediaEvent::MetadataLoaded {
                duration: Some(1.0)
            }
        );
    }

    #[test]
    fn playing_from_past_the_end_ends_instead_of_replaying() {
        let mut media = NativeMedia::spawn(quick());
        let sub = media.subscribe();
        media.load(&decode::write_ramp_wav("native-past-end"), None);
        assert!(matches!(next_event(&sub), MediaEvent::MetadataLoaded { .. }));

        media.set_position(45.0);
        assert_eq!(next_event(&sub), MediaEvent::TimeUpdate { position: 1.0 });
        media.play();
        loop {
            match next_event(&sub) {
                MediaEvent::Ended => break,
                MediaEvent::TimeUpdate { position } => assert_eq!(position, 1.0),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn stop_discards_the_loaded_source() {
        let mut media = NativeMedia::spawn(quick());
        let sub = media.subscribe();
        media.load(&decode::write_ramp_wav("native-stop"), None);
        media.stop();
        media.play();
        media.set_position(0.5);
        thread::sleep(Duration::from_millis(300));
        let events: Vec<MediaEvent> = sub.events.try_iter().collect();
        assert!(
            events
                .iter()
                .all(|e| matches!(e, MediaEvent::MetadataLoaded { .. })),
            "{events:?}"
        );
    }

    #[test]
    fn volume_and_mute_apply_immediately() {
        let mut media = NativeMedia::spawn(quick());
        media.set_volume(0.4);
        media.set_muted(true);
        assert_eq!(media.volume.volume(), 0.4);
        assert_eq!(media.volume.gain(), 0.0);
        media.set_muted(false);
        assert_eq!(media.volume.gain(), 0.4);
    }
}
