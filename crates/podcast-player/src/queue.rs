//! Bounded sample queue shared between pipeline stages.
//!
//! decode thread → queue → resample thread → queue → output callback.
//! Samples are interleaved `f32`; the channel count is fixed per queue.
//! Closing a queue wakes every waiter: producers stop pushing, consumers
//! drain what is left and then see `None`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// How a consumer wants to take frames out of a [`SampleQueue`].
#[derive(Clone, Copy, Debug)]
pub enum Take {
    /// Block until exactly `frames` are buffered; `None` if closed short.
    Exact { frames: usize },
    /// Block until anything is buffered, then take up to `max_frames`.
    UpTo { max_frames: usize },
    /// Never block; `None` when nothing is buffered right now.
    Available { max_frames: usize },
}

struct Inner {
    samples: VecDeque<f32>,
    closed: bool,
}

/// Thread-safe bounded FIFO of interleaved samples.
pub struct SampleQueue {
    channels: usize,
    capacity: usize,
    inner: Mutex<Inner>,
    changed: Condvar,
}

/// Capacity in samples for `seconds` of audio at `rate_hz` with `channels`.
///
/// Non-finite or non-positive `seconds` fall back to two seconds.
pub fn capacity_for(rate_hz: u32, channels: usize, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels.max(1))
}

impl SampleQueue {
    pub fn new(channels: usize, capacity: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            capacity: capacity.max(channels),
            inner: Mutex::new(Inner {
                samples: VecDeque::new(),
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffered frames at the time of the call.
    pub fn len_frames(&self) -> usize {
        self.inner.lock().unwrap().samples.len() / self.channels
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Mark the stream finished. Idempotent.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.changed.notify_all();
    }

    /// Append samples, waiting for room. Returns early (dropping the rest)
    /// once the queue is closed.
    pub fn push(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.samples.len() >= self.capacity && !g.closed {
                g = self.changed.wait(g).unwrap();
            }
            if g.closed {
                return;
            }
            let room = self.capacity - g.samples.len();
            let end = (offset + room).min(samples.len());
            g.samples.extend(&samples[offset..end]);
            offset = end;
            drop(g);
            self.changed.notify_all();
        }
    }

    /// Remove whole frames according to `take`.
    pub fn take(&self, take: Take) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        let frames = match take {
            Take::Exact { frames } => {
                let want = frames * self.channels;
                while g.samples.len() < want && !g.closed {
                    g = self.changed.wait(g).unwrap();
                }
                if g.samples.len() < want {
                    return None;
                }
                frames
            }
            Take::UpTo { max_frames } => {
                while g.samples.is_empty() && !g.closed {
                    g = self.changed.wait(g).unwrap();
                }
                (g.samples.len() / self.channels).min(max_frames)
            }
            Take::Available { max_frames } => (g.samples.len() / self.channels).min(max_frames),
        };
        if frames == 0 {
            return None;
        }
        let out: Vec<f32> = g.samples.drain(..frames * self.channels).collect();
        drop(g);
        self.changed.notify_all();
        Some(out)
    }

    /// Block until the queue is closed and drained, or `cancel` is raised.
    ///
    /// Returns `true` when drained, `false` when cancelled.
    pub fn wait_drained(&self, cancel: &AtomicBool) -> bool {
        let mut g = self.inner.lock().unwrap();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.closed && g.samples.is_empty() {
                return true;
            }
            g = self
                .changed
                .wait_timeout(g, Duration::from_millis(50))
                .unwrap()
                .0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn capacity_for_falls_back_on_bad_seconds() {
        assert_eq!(capacity_for(48_000, 2, 2.0), 192_000);
        assert_eq!(capacity_for(48_000, 2, 0.0), 192_000);
        assert_eq!(capacity_for(48_000, 2, f32::NAN), 192_000);
    }

    #[test]
    fn available_take_on_empty_queue_is_none() {
        let q = SampleQueue::new(2, 16);
        assert!(q.take(Take::Available { max_frames: 4 }).is_none());
    }

    #[test]
    fn available_take_returns_whole_frames_in_order() {
        let q = SampleQueue::new(2, 64);
        q.push(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = q.take(Take::Available { max_frames: 8 }).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(q.len_frames(), 0);
    }

    #[test]
    fn exact_take_waits_for_producer() {
        let q = Arc::new(SampleQueue::new(2, 64));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.take(Take::Exact { frames: 3 }))
        };
        q.push(&[0.1, 0.2, 0.3, 0.4]);
        q.push(&[0.5, 0.6]);
        let out = consumer.join().unwrap().unwrap();
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn exact_take_after_close_is_none() {
        let q = SampleQueue::new(1, 8);
        q.push(&[1.0]);
        q.close();
        assert!(q.take(Take::Exact { frames: 2 }).is_none());
    }

    #[test]
    fn up_to_take_drains_tail_then_ends() {
        let q = SampleQueue::new(2, 64);
        q.push(&[1.0, 2.0, 3.0, 4.0]);
        q.close();
        assert_eq!(q.take(Take::UpTo { max_frames: 8 }).unwrap().len(), 4);
        assert!(q.take(Take::UpTo { max_frames: 8 }).is_none());
    }

    #[test]
    fn push_returns_when_closed_while_full() {
        let q = Arc::new(SampleQueue::new(1, 2));
        let producer = {
            let q = q.clone();
            thread::spawn(move || q.push(&[1.0, 2.0, 3.0, 4.0]))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        producer.join().unwrap();
        assert_eq!(q.len_frames(), 2);
    }

    #[test]
    fn wait_drained_reports_cancel() {
        let q = SampleQueue::new(2, 64);
        let cancel = AtomicBool::new(true);
        assert!(!q.wait_drained(&cancel));

        let cancel = AtomicBool::new(false);
        q.close();
        assert!(q.wait_drained(&cancel));
    }
}
