//! Seam between the playback controller and a native audio backend.
//!
//! A backend accepts fire-and-forget transport commands and reports what
//! actually happened through [`MediaEvent`]s delivered to every registered
//! listener.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Events emitted by a media backend.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    /// Source probed; `duration` is `None` when the container does not know it.
    MetadataLoaded { duration: Option<f64> },
    /// Periodic position report while output is running, in seconds.
    TimeUpdate { position: f64 },
    /// The stream played through to its end.
    Ended,
    /// Load, decode, transport or device failure.
    Error(String),
}

/// Identifies one registered listener.
pub type ListenerId = u64;

/// A registered listener: its id and the receiving end of its event channel.
pub struct Subscription {
    pub id: ListenerId,
    pub events: Receiver<MediaEvent>,
}

/// Transport surface of a native audio backend.
///
/// All commands are fire-and-forget. Failures are reported asynchronously as
/// [`MediaEvent::Error`].
pub trait MediaHandle {
    /// Start loading `source` (local path or http(s) URL). `mime` is a format hint.
    fn load(&mut self, source: &str, mime: Option<&str>);
    fn play(&mut self);
    fn pause(&mut self);
    /// Stop output and drop the loaded source. A later `load` starts afresh.
    fn stop(&mut self);
    /// Move the playback position, in seconds.
    fn set_position(&mut self, seconds: f64);
    fn set_rate(&mut self, rate: f64);
    /// Output gain in `[0, 1]`.
    fn set_volume(&mut self, volume: f32);
    fn set_muted(&mut self, muted: bool);
    /// Register a listener for backend events.
    fn subscribe(&mut self) -> Subscription;
    /// Remove a listener registered by [`MediaHandle::subscribe`].
    fn unsubscribe(&mut self, id: ListenerId);
}

/// Listener registry shared between a backend handle and its worker thread.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    senders: Mutex<Vec<(ListenerId, Sender<MediaEvent>)>>,
}

impl Listeners {
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = unbounded();
        if let Ok(mut senders) = self.senders.lock() {
            senders.push((id, tx));
        }
        Subscription { id, events: rx }
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|(sid, _)| *sid != id);
        }
    }

    /// Deliver `event` to every listener; listeners whose receiver is gone are dropped.
    pub fn emit(&self, event: MediaEvent) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        }
    }

    pub fn len(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
